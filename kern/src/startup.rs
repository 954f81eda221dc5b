//! Kernel cold boot: turns a board's compiled-in `app::AppTasks` list into
//! a populated task table and hands control to the first task.
//!
//! There is no ROM app header to parse and no region table to validate --
//! per `spec.md`'s non-goal of dynamic task loading, every task a build
//! will ever run is named here, at compile time, by the board crate.

use abi::Pid;

use crate::app::AppTasks;
use crate::arch;
use crate::config::MAX_TASKS;
use crate::err::FaultKind;
use crate::fault;
use crate::mpu;
use crate::state::Kernel;
use crate::syscalls::{self, CallFrame, Disposition};
use crate::task::TaskState;
use crate::tick;

/// The kernel's one instance of its bundled state. `static mut` because
/// every access happens from exception context under the same mutual
/// exclusion the architecture layer already provides for `arch`'s own
/// globals; see `state::Kernel`'s doc comment.
static mut KERNEL: Kernel = Kernel::new();

/// Exception-context-only accessor. Safe to call from `SVCall`, `SysTick`,
/// and `PendSV` handlers; never call this from ordinary code.
pub unsafe fn kernel_mut() -> &'static mut Kernel {
    &mut KERNEL
}

/// Builds the task table from `tasks`, allocates each task's stack out of
/// the heap, and starts the highest-priority one. Never returns.
///
/// # Safety
///
/// Must be called exactly once, before interrupts are unmasked, with the
/// MPU not yet configured.
pub unsafe fn cold_boot(tasks: AppTasks) -> ! {
    assert!(tasks.len() <= MAX_TASKS, "board names more tasks than MAX_TASKS");

    let kernel = kernel_mut();
    arch::configure_static_regions();

    for (i, spec) in tasks.iter().enumerate() {
        let alloc = kernel
            .heap
            .allocate(spec.stack_bytes.max(1))
            .expect("out of SRAM for a task's initial stack at boot");

        let mut srd_mask = mpu::SrdMask::DENY_ALL;
        mpu::add_access_window(&mut srd_mask, &kernel.heap, alloc.base_addr, alloc.size_bytes);

        let stack_top = alloc.base_addr + alloc.size_bytes;
        let sp = arch::reinitialize(spec.entry, stack_top);

        let t = &mut kernel.tasks.tasks[i];
        t.state = TaskState::Ready;
        t.pid = Pid(spec.entry as usize as u32);
        t.name = spec.name;
        t.priority = spec.priority;
        t.current_priority = spec.priority;
        t.stack_base = alloc.base_addr;
        t.stack_bytes = alloc.size_bytes;
        t.sp_init = sp;
        t.sp = sp;
        t.srd_mask = srd_mask;
    }

    kernel.current = kernel.scheduler.pick_next(&kernel.tasks.tasks);
    arch::apply_memory_protection(kernel.tasks.tasks[kernel.current].srd_mask);
    arch::start_first_task(kernel.tasks.tasks[kernel.current].sp)
}

/// Bridges `SVCall` to the dispatcher. Called by `arch` with the decoded SVC
/// immediate and a `CallFrame` over the stacked registers; returns whether
/// `arch` should follow up with a context switch, a reset, or a fault.
///
/// # Safety
///
/// Must be called only from `SVCall` exception context.
pub unsafe fn handle_svc(svc_number: u32, frame: &mut dyn CallFrame) -> Disposition {
    syscalls::dispatch(kernel_mut(), svc_number, frame)
}

/// Bridges `SysTick` to `tick::handle_tick`. Returns whether `arch` should
/// pend a context switch.
///
/// # Safety
///
/// Must be called only from `SysTick` exception context.
pub unsafe fn handle_tick() -> bool {
    tick::handle_tick(kernel_mut())
}

/// Bridges `PendSV` to the scheduler and MPU switch.
///
/// `arch` has already pushed `r4-r11`/`lr` onto the outgoing task's own
/// process stack and passes the resulting stack pointer as `old_psp`,
/// together with a `CpuTimeCounter::now()` sample taken at the same moment.
/// This records that pointer as the outgoing task's `sp`, charges it for the
/// time it just ran, asks the scheduler for the next task, re-applies that
/// task's MPU mask, and returns its saved stack pointer for `arch` to
/// restore into `PSP`.
///
/// # Safety
///
/// Must be called only from `PendSV` exception context.
pub unsafe fn handle_switch(old_psp: u32, now: u32) -> u32 {
    let kernel = kernel_mut();
    let outgoing = kernel.current;

    let delta = crate::time::elapsed(kernel.last_switch_counter, now);
    kernel.tasks.tasks[outgoing].cpu_time.add(delta);
    kernel.last_switch_counter = now;
    kernel.tasks.tasks[outgoing].sp = old_psp;

    kernel.current = kernel.scheduler.pick_next(&kernel.tasks.tasks);
    let incoming = &kernel.tasks.tasks[kernel.current];
    arch::apply_memory_protection(incoming.srd_mask);
    incoming.sp
}

/// Bridges a fault exception (`MemoryManagement`, `UsageFault`, `BusFault`,
/// `HardFault`) to `fault::handle_fault`, attributing it to the currently
/// running task. Returns whether `arch` should pend a context switch (the
/// faulting task was killed and scheduling should continue) or halt.
///
/// # Safety
///
/// Must be called only from fault exception context.
pub unsafe fn handle_fault(kind: FaultKind) -> bool {
    let kernel = kernel_mut();
    let current = kernel.current;
    fault::handle_fault(kernel, current, kind)
}
