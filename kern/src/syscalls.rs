//! The supervisor-call dispatcher: the sixteen primitives a task may
//! invoke, decoded from the SVC immediate operand (see `arch::arm_m`'s
//! `getSvcNumber` equivalent) and carried out against the single
//! `state::Kernel`.
//!
//! Every handler here runs with interrupts masked at `SVCall` priority, so
//! it can mutate the task table, the sync tables, and the heap freely --
//! the architecture layer is responsible for calling `dispatch` only from
//! that context and for re-applying the (possibly just-changed) current
//! task's MPU mask afterward.

use core::convert::TryFrom;

use abi::{sentinel, BadSyscall, Pid, PsEntry, PsTable, Syscall, TaskName, TaskState as AbiTaskState};

use crate::config::{MAX_MUTEXES, MAX_SEMAPHORES, NUM_PRIORITIES};
use crate::err::{FaultKind, KernelError};
use crate::mpu;
use crate::scheduler::Mode;
use crate::state::Kernel;
use crate::sync::{self, LockOutcome, WaitOutcome};
use crate::task::TaskState;
use crate::umem;

/// The architecture layer's view of the stacked exception frame, narrowed
/// to what the dispatcher needs: up to four word arguments (R0-R3, stacked
/// automatically on SVC entry) and a place to write the result back into
/// R0 for the task to see on return.
pub trait CallFrame {
    fn arg(&self, n: usize) -> u32;
    fn set_return(&mut self, value: u32);
}

/// What the architecture layer should do once `dispatch` returns.
pub enum Disposition {
    /// The caller keeps running; its return value is already set.
    Continue,
    /// Something became runnable, blocked, or was killed -- run the
    /// scheduler and context-switch before returning to user code.
    SwitchNeeded,
    /// `REBOOT` was called. The architecture layer performs the actual
    /// reset (e.g. writing `SCB::AIRCR`); `dispatch` itself has no access
    /// to that register.
    Reboot,
    /// The SVC immediate operand didn't name a known call. Routed to the
    /// same fault path as a `UsageFault`.
    Fault(FaultKind),
}

fn status(result: Result<(), KernelError>) -> u32 {
    match result {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Reads up to `MAX_TASK_NAME_LEN` bytes from the calling task's memory at
/// `ptr`/`len`, validating the range against its `srd_mask` first.
fn read_name(kernel: &Kernel, caller: usize, ptr: u32, len: u32) -> Option<TaskName> {
    let mut buf = [0u8; abi::MAX_TASK_NAME_LEN];
    let n = (len as usize).min(buf.len());
    let task = &kernel.tasks.tasks[caller];
    let copied = unsafe { umem::copy_from_task(task, ptr, n, &mut buf)? };
    Some(TaskName::new(&buf[..copied]))
}

/// Decodes `svc_number` and carries out the named call against `kernel`,
/// reading arguments from and writing the result into `frame`.
pub fn dispatch(kernel: &mut Kernel, svc_number: u32, frame: &mut dyn CallFrame) -> Disposition {
    let call = match Syscall::try_from(svc_number) {
        Ok(c) => c,
        Err(BadSyscall(_)) => return Disposition::Fault(FaultKind::Usage),
    };
    let current = kernel.current;

    match call {
        Syscall::Start => {
            // Takes no input (§4.4): this is the first dispatch, not a
            // way to resurrect a `Stopped` task. `reset_for_stop`/`KILL`
            // already zeroed a stopped task's `sp_init` and freed its
            // heap allocation, so reusing it here without reallocating a
            // stack (as an earlier revision did) handed the task a `sp`
            // of 0 and crashed on the next dispatch. Resurrecting a
            // stopped task by name is `RESTART`'s job, which reallocates.
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::Restart => {
            let Some(name) = read_name(kernel, current, frame.arg(0), frame.arg(1)) else {
                frame.set_return(status(Err(KernelError::PermissionViolation)));
                return Disposition::Continue;
            };
            let Some(idx) = kernel.tasks.find_stopped_by_name(&name) else {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            };
            let stack_bytes = kernel.tasks.tasks[idx].stack_bytes.max(1024);
            let Some(alloc) = kernel.heap.allocate(stack_bytes) else {
                frame.set_return(status(Err(KernelError::ResourceExhausted)));
                return Disposition::Continue;
            };
            let t = &mut kernel.tasks.tasks[idx];
            t.stack_base = alloc.base_addr;
            t.stack_bytes = alloc.size_bytes;
            mpu::add_access_window(&mut t.srd_mask, &kernel.heap, alloc.base_addr, alloc.size_bytes);
            t.sp_init = alloc.base_addr + alloc.size_bytes;
            t.sp = t.sp_init;
            t.state = TaskState::Ready;
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::SetPrio => {
            let pid = Pid(frame.arg(0));
            let priority = frame.arg(1) as u8;
            let result = (|| {
                if priority as usize >= NUM_PRIORITIES {
                    return Err(KernelError::InvalidArgument);
                }
                let idx = kernel.tasks.find_by_pid(pid).ok_or(KernelError::InvalidArgument)?;
                kernel.tasks.tasks[idx].priority = priority;
                kernel.tasks.tasks[idx].current_priority = priority;
                Ok(())
            })();
            frame.set_return(status(result));
            Disposition::SwitchNeeded
        }

        Syscall::Yield => {
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::Sleep => {
            let ticks = frame.arg(0);
            if ticks == 0 {
                frame.set_return(0);
                return Disposition::SwitchNeeded;
            }
            kernel.tasks.tasks[current].ticks = ticks;
            kernel.tasks.tasks[current].state = TaskState::Delayed;
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::Lock => {
            let idx = frame.arg(0) as usize;
            if idx >= MAX_MUTEXES {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            }
            match sync::lock(&mut kernel.mutexes[idx], current) {
                Ok(LockOutcome::Acquired) => {
                    kernel.tasks.tasks[current].mutex_held = Some(idx);
                    frame.set_return(0);
                    Disposition::Continue
                }
                Ok(LockOutcome::Blocked) => {
                    kernel.tasks.tasks[current].mutex_held = Some(idx);
                    kernel.tasks.tasks[current].state = TaskState::BlockedMutex;
                    if kernel.priority_inheritance {
                        if let Some(owner) = kernel.mutexes[idx].owner {
                            let caller_prio = kernel.tasks.tasks[current].current_priority;
                            if kernel.tasks.tasks[owner].current_priority > caller_prio {
                                kernel.tasks.tasks[owner].current_priority = caller_prio;
                            }
                        }
                    }
                    frame.set_return(0);
                    Disposition::SwitchNeeded
                }
                Err(e) => {
                    frame.set_return(status(Err(e)));
                    Disposition::Continue
                }
            }
        }

        Syscall::Unlock => {
            let idx = frame.arg(0) as usize;
            if idx >= MAX_MUTEXES {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            }
            match sync::unlock(&mut kernel.mutexes[idx], current) {
                Ok(woken) => {
                    kernel.tasks.tasks[current].mutex_held = None;
                    if kernel.priority_inheritance {
                        let base = kernel.tasks.tasks[current].priority;
                        kernel.tasks.tasks[current].current_priority = base;
                    }
                    if let Some(next) = woken {
                        kernel.tasks.tasks[next].mutex_held = Some(idx);
                        kernel.tasks.tasks[next].state = TaskState::Ready;
                    }
                    frame.set_return(0);
                    Disposition::SwitchNeeded
                }
                Err(e) => {
                    // Non-owner unlock: per the documented contract, ignored.
                    frame.set_return(status(Err(e)));
                    Disposition::Continue
                }
            }
        }

        Syscall::Wait => {
            let idx = frame.arg(0) as usize;
            if idx >= MAX_SEMAPHORES {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            }
            match sync::wait(&mut kernel.semaphores[idx], current) {
                Ok(WaitOutcome::Acquired) => {
                    frame.set_return(0);
                    Disposition::Continue
                }
                Ok(WaitOutcome::Blocked) => {
                    kernel.tasks.tasks[current].sem_waiting_on = Some(idx);
                    kernel.tasks.tasks[current].state = TaskState::BlockedSemaphore;
                    frame.set_return(0);
                    Disposition::SwitchNeeded
                }
                Err(e) => {
                    frame.set_return(status(Err(e)));
                    Disposition::Continue
                }
            }
        }

        Syscall::Post => {
            let idx = frame.arg(0) as usize;
            if idx >= MAX_SEMAPHORES {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            }
            if let Some(woken) = sync::post(&mut kernel.semaphores[idx]) {
                kernel.tasks.tasks[woken].sem_waiting_on = None;
                kernel.tasks.tasks[woken].state = TaskState::Ready;
            }
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::Malloc => {
            let size = frame.arg(0);
            match kernel.heap.allocate(size) {
                Some(alloc) => {
                    let task = &mut kernel.tasks.tasks[current];
                    mpu::add_access_window(&mut task.srd_mask, &kernel.heap, alloc.base_addr, alloc.size_bytes);
                    frame.set_return(alloc.base_addr);
                }
                None => frame.set_return(sentinel::NONE),
            }
            Disposition::Continue
        }

        Syscall::Reboot => {
            frame.set_return(0);
            Disposition::Reboot
        }

        Syscall::Ps => {
            let buf_ptr = frame.arg(0);
            let buf_len = frame.arg(1) as usize;
            let mut table = PsTable::default();
            for t in kernel.tasks.tasks.iter().filter(|t| t.state != TaskState::Invalid) {
                if table.count as usize >= abi::MAX_PS_ENTRIES {
                    break;
                }
                table.entries[table.count as usize] = PsEntry {
                    pid: t.pid,
                    name: t.name,
                    priority: t.priority,
                    state: AbiTaskState::from(t.state),
                    cpu_time: t.cpu_time.inactive(),
                };
                table.count += 1;
            }
            let bytes = unsafe {
                core::slice::from_raw_parts(
                    (&table as *const PsTable) as *const u8,
                    core::mem::size_of::<PsTable>(),
                )
            };
            let task = &kernel.tasks.tasks[current];
            let copied = unsafe { umem::copy_to_task(task, buf_ptr, buf_len, bytes) };
            match copied {
                Some(_) => frame.set_return(table.count),
                None => frame.set_return(sentinel::NONE),
            }
            Disposition::Continue
        }

        Syscall::Kill => {
            let pid = Pid(frame.arg(0));
            let Some(idx) = kernel.tasks.find_by_pid(pid) else {
                frame.set_return(status(Err(KernelError::InvalidArgument)));
                return Disposition::Continue;
            };
            kill_task(kernel, idx);
            frame.set_return(0);
            Disposition::SwitchNeeded
        }

        Syscall::Preempt => {
            // Returns the *previous* setting, not just zero, so a task can
            // nest disable/restore pairs correctly (this is what backs
            // `userlib`'s `critical_section` impl: acquire disables and
            // remembers the old value, release restores exactly that).
            let was_enabled = kernel.preemption_enabled;
            kernel.preemption_enabled = frame.arg(0) != 0;
            frame.set_return(was_enabled as u32);
            Disposition::Continue
        }

        Syscall::Sched => {
            kernel.scheduler.set_mode(if frame.arg(0) == 0 { Mode::Priority } else { Mode::RoundRobin });
            frame.set_return(0);
            Disposition::Continue
        }

        Syscall::PidOf => {
            match read_name(kernel, current, frame.arg(0), frame.arg(1)) {
                Some(name) => match kernel.tasks.find_active_by_name(&name) {
                    Some(idx) => frame.set_return(kernel.tasks.tasks[idx].pid.0),
                    None => frame.set_return(sentinel::NONE),
                },
                None => frame.set_return(sentinel::NONE),
            }
            Disposition::Continue
        }
    }
}

/// Tears a task down: removes it from whatever queue it was blocked in (or
/// hands its owned mutex, if any, to the next waiter), frees every heap
/// block its `srd_mask` grants, and resets the slot to `Stopped`.
///
/// `pub(crate)` rather than private: `fault::handle_fault` reuses this exact
/// teardown for a task killed by a memory protection fault, so the two
/// teardown paths (explicit `KILL` and fault recovery) can never drift apart.
pub(crate) fn kill_task(kernel: &mut Kernel, idx: usize) {
    match kernel.tasks.tasks[idx].state {
        TaskState::BlockedMutex => {
            if let Some(m) = kernel.tasks.tasks[idx].mutex_held {
                kernel.mutexes[m].queue.remove(idx);
            }
        }
        TaskState::BlockedSemaphore => {
            if let Some(s) = kernel.tasks.tasks[idx].sem_waiting_on {
                kernel.semaphores[s].queue.remove(idx);
            }
        }
        _ => {
            if let Some(m) = kernel.tasks.tasks[idx].mutex_held {
                if kernel.mutexes[m].owner == Some(idx) {
                    if let Ok(Some(next)) = sync::unlock(&mut kernel.mutexes[m], idx) {
                        kernel.tasks.tasks[next].mutex_held = Some(m);
                        kernel.tasks.tasks[next].state = TaskState::Ready;
                    }
                }
            }
        }
    }
    kernel.heap.free_owned(&kernel.tasks.tasks[idx].srd_mask);
    kernel.tasks.tasks[idx].reset_for_stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;

    struct FakeFrame {
        args: [u32; 4],
        ret: u32,
    }

    impl FakeFrame {
        fn new(args: [u32; 4]) -> Self {
            FakeFrame { args, ret: 0 }
        }
    }

    impl CallFrame for FakeFrame {
        fn arg(&self, n: usize) -> u32 {
            self.args[n]
        }
        fn set_return(&mut self, value: u32) {
            self.ret = value;
        }
    }

    fn make_ready(kernel: &mut Kernel, idx: usize, pid: u32, priority: u8) {
        kernel.tasks.tasks[idx].state = TaskState::Ready;
        kernel.tasks.tasks[idx].pid = Pid(pid);
        kernel.tasks.tasks[idx].priority = priority;
        kernel.tasks.tasks[idx].current_priority = priority;
    }

    #[test]
    fn bad_syscall_number_faults() {
        let mut kernel = Kernel::new();
        let mut frame = FakeFrame::new([0; 4]);
        let d = dispatch(&mut kernel, 99, &mut frame);
        assert!(matches!(d, Disposition::Fault(FaultKind::Usage)));
    }

    #[test]
    fn malloc_grants_access_on_success() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 0x2000_0000, 0);
        kernel.current = 0;
        let mut frame = FakeFrame::new([100, 0, 0, 0]);
        let d = dispatch(&mut kernel, Syscall::Malloc as u32, &mut frame);
        assert!(matches!(d, Disposition::Continue));
        assert_ne!(frame.ret, sentinel::NONE);
        assert_ne!(kernel.tasks.tasks[0].srd_mask, mpu::SrdMask::DENY_ALL);
    }

    #[test]
    fn lock_then_unlock_wakes_blocked_waiter() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 1, 0);
        make_ready(&mut kernel, 1, 2, 0);

        kernel.current = 0;
        let mut f0 = FakeFrame::new([3, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Lock as u32, &mut f0);
        assert_eq!(kernel.tasks.tasks[0].mutex_held, Some(3));

        kernel.current = 1;
        let mut f1 = FakeFrame::new([3, 0, 0, 0]);
        let d = dispatch(&mut kernel, Syscall::Lock as u32, &mut f1);
        assert!(matches!(d, Disposition::SwitchNeeded));
        assert_eq!(kernel.tasks.tasks[1].state, TaskState::BlockedMutex);

        kernel.current = 0;
        let mut f2 = FakeFrame::new([3, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Unlock as u32, &mut f2);
        assert_eq!(kernel.tasks.tasks[1].state, TaskState::Ready);
        assert_eq!(kernel.mutexes[3].owner, Some(1));
    }

    #[test]
    fn kill_frees_heap_and_transfers_owned_mutex() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 1, 0);
        make_ready(&mut kernel, 1, 2, 0);

        kernel.current = 0;
        let alloc = kernel.heap.allocate(100).unwrap();
        mpu::add_access_window(&mut kernel.tasks.tasks[0].srd_mask, &kernel.heap, alloc.base_addr, alloc.size_bytes);
        let mut lf = FakeFrame::new([2, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Lock as u32, &mut lf);

        kernel.current = 1;
        let mut lf1 = FakeFrame::new([2, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Lock as u32, &mut lf1);
        assert_eq!(kernel.tasks.tasks[1].state, TaskState::BlockedMutex);

        let mut kf = FakeFrame::new([1, 0, 0, 0]);
        let d = dispatch(&mut kernel, Syscall::Kill as u32, &mut kf);
        assert!(matches!(d, Disposition::SwitchNeeded));
        assert_eq!(kernel.tasks.tasks[0].state, TaskState::Stopped);
        assert_eq!(kernel.mutexes[2].owner, Some(1));
        assert_eq!(kernel.tasks.tasks[1].state, TaskState::Ready);

        // Freed block is reusable.
        let c = kernel.heap.allocate(100).unwrap();
        assert_eq!(c.base_addr, alloc.base_addr);
    }

    #[test]
    fn sleep_sets_delayed_state() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 1, 0);
        kernel.current = 0;
        let mut frame = FakeFrame::new([50, 0, 0, 0]);
        let d = dispatch(&mut kernel, Syscall::Sleep as u32, &mut frame);
        assert!(matches!(d, Disposition::SwitchNeeded));
        assert_eq!(kernel.tasks.tasks[0].state, TaskState::Delayed);
        assert_eq!(kernel.tasks.tasks[0].ticks, 50);
    }

    #[test]
    fn preempt_returns_previous_setting() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 1, 0);
        kernel.current = 0;
        assert!(!kernel.preemption_enabled);

        let mut f0 = FakeFrame::new([1, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Preempt as u32, &mut f0);
        assert_eq!(f0.ret, 0);
        assert!(kernel.preemption_enabled);

        let mut f1 = FakeFrame::new([0, 0, 0, 0]);
        dispatch(&mut kernel, Syscall::Preempt as u32, &mut f1);
        assert_eq!(f1.ret, 1);
        assert!(!kernel.preemption_enabled);
    }

    #[test]
    fn set_prio_rejects_out_of_range_priority() {
        let mut kernel = Kernel::new();
        make_ready(&mut kernel, 0, 1, 0);
        kernel.current = 0;
        let mut frame = FakeFrame::new([1, 200, 0, 0]);
        dispatch(&mut kernel, Syscall::SetPrio as u32, &mut frame);
        assert_eq!(frame.ret, 1);
        assert_eq!(kernel.tasks.tasks[0].priority, 0);
    }
}
