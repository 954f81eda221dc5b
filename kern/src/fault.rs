//! Turns a raw CPU fault, already classified by `arch` into a `FaultKind`,
//! into a kernel-level disposition: kill the offending task and keep
//! scheduling, or halt outright.
//!
//! Grounded on `original_source/PreemptOS Code/faults.c`'s three-way split
//! (MemManage is recoverable in isolation; everything else is treated as a
//! kernel-fatal condition) and on the teacher's `arch::arm_m::mem_manage_fault`
//! for how a naked exception entry hands off to safe Rust: the architecture
//! layer reads the fault status/address registers, builds a `FaultKind`, and
//! calls straight into here with nothing more than that and the faulting
//! task's index.

use crate::err::FaultKind;
use crate::state::Kernel;
use crate::syscalls::kill_task;

/// Handles a fault attributed to `task_idx`. Returns `true` if the kernel
/// should keep running (having torn the task down and left the rest of the
/// system schedulable), `false` if the architecture layer should halt.
///
/// - `MemoryProtection`: the MPU did its job. The offending task is killed
///   exactly as `KILL` would (same teardown, same heap/mutex release) and
///   the system carries on -- this is the entire point of per-task
///   isolation, recoverable by construction.
/// - `Usage` / `Bus`: an instruction or memory-system fault the kernel has
///   no principled way to attribute to "just that task" (an unaligned
///   access under `UNALIGN_TRP`, a bus error from a misconfigured static
///   region). Per the design notes, the kernel halts rather than guessing.
/// - `Hard`: unrecoverable by definition; always halts.
pub fn handle_fault(kernel: &mut Kernel, task_idx: usize, kind: FaultKind) -> bool {
    let pid = kernel.tasks.tasks[task_idx].pid;
    match kind {
        FaultKind::MemoryProtection { address } => {
            klog!("mem fault: task {:?} pid={:?} addr={:#010x} -- killing", task_idx, pid, address);
            kill_task(kernel, task_idx);
            true
        }
        FaultKind::Usage => {
            klog!("usage fault: task {:?} pid={:?} -- halting", task_idx, pid);
            false
        }
        FaultKind::Bus => {
            klog!("bus fault: task {:?} pid={:?} -- halting", task_idx, pid);
            false
        }
        FaultKind::Hard => {
            klog!("hard fault: task {:?} pid={:?} -- halting", task_idx, pid);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    fn ready(kernel: &mut Kernel, idx: usize) {
        kernel.tasks.tasks[idx].state = TaskState::Ready;
        kernel.tasks.tasks[idx].pid = abi::Pid(0x2000_0000 + idx as u32);
    }

    #[test]
    fn memory_protection_fault_kills_task_and_continues() {
        let mut kernel = Kernel::new();
        ready(&mut kernel, 0);
        let alloc = kernel.heap.allocate(100).unwrap();
        crate::mpu::add_access_window(&mut kernel.tasks.tasks[0].srd_mask, &kernel.heap, alloc.base_addr, alloc.size_bytes);

        let keep_going = handle_fault(&mut kernel, 0, FaultKind::MemoryProtection { address: alloc.base_addr });
        assert!(keep_going);
        assert_eq!(kernel.tasks.tasks[0].state, TaskState::Stopped);
        // Heap block the task owned is freed by the same teardown KILL uses.
        let reused = kernel.heap.allocate(100).unwrap();
        assert_eq!(reused.base_addr, alloc.base_addr);
    }

    #[test]
    fn usage_and_bus_faults_halt() {
        let mut kernel = Kernel::new();
        ready(&mut kernel, 0);
        assert!(!handle_fault(&mut kernel, 0, FaultKind::Usage));
        assert!(!handle_fault(&mut kernel, 0, FaultKind::Bus));
        assert!(!handle_fault(&mut kernel, 0, FaultKind::Hard));
    }
}
