//! An implementation of the `critical-section` crate's acquire/release
//! hooks backed by the `PREEMPT` supervisor call.
//!
//! Unlike a cooperative, IPC-only kernel -- where nothing can interrupt a
//! task's own code and a critical section is free -- this kernel preempts
//! a running task from `SysTick` whenever tick-driven preemption is
//! enabled (`spec.md` §5). A task that needs a real critical section around
//! a shared static therefore has to actually ask the kernel to stop doing
//! that: `acquire` disables preemption and remembers whatever the previous
//! setting was, and `release` restores exactly that setting rather than
//! unconditionally re-enabling it, so nested critical sections compose
//! correctly (the same restore-previous-value contract `sys_preempt`
//! documents).

use critical_section::RawRestoreState;

struct KernelPreemption;
critical_section::set_impl!(KernelPreemption);

unsafe impl critical_section::Impl for KernelPreemption {
    #[inline(always)]
    unsafe fn acquire() -> RawRestoreState {
        crate::sys_preempt(false)
    }

    #[inline(always)]
    unsafe fn release(was_enabled: RawRestoreState) {
        if was_enabled {
            crate::sys_preempt(true);
        }
    }
}
