//! Ergonomic wrappers around the raw `sys_*` supervisor-call stubs.
//!
//! A task body reaches for these, not for `sys_*` directly: they turn the
//! boolean/sentinel return conventions of the raw ABI into `Option`/`bool`
//! shapes that read naturally at a call site, and they own the handful of
//! small pieces of plumbing (the `PS` destination buffer, the `'static`
//! text required by `RESTART`/`PIDOF`) that every caller would otherwise
//! have to repeat.

use crate::{sys_kill, sys_lock, sys_malloc, sys_pidof, sys_post, sys_preempt, sys_ps, sys_reboot,
            sys_restart, sys_sched, sys_set_prio, sys_sleep, sys_start, sys_unlock, sys_wait,
            sys_yield};
use abi::{Pid, PsTable};

/// Blocks the caller for at least `ticks` system-timer ticks.
#[inline(always)]
pub fn sleep_for(ticks: u32) {
    sys_sleep(ticks)
}

/// Gives up the remainder of the caller's timeslice without blocking.
#[inline(always)]
pub fn yield_now() {
    sys_yield()
}

/// A mutex slot index, handed out by whatever static configuration assigns
/// mutex numbers to resources. The kernel owns mutex storage; this is just
/// a typed handle onto one row of it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Mutex(pub usize);

impl Mutex {
    /// Acquires the mutex, blocking if another task currently owns it.
    /// `false` only if this index doesn't name a configured mutex.
    #[inline(always)]
    pub fn lock(self) -> bool {
        sys_lock(self.0)
    }

    /// Releases the mutex. A no-op, not a panic, if the caller doesn't
    /// actually own it.
    #[inline(always)]
    pub fn unlock(self) -> bool {
        sys_unlock(self.0)
    }
}

/// A counting-semaphore slot index, the `WAIT`/`POST` counterpart of
/// [`Mutex`].
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Semaphore(pub usize);

impl Semaphore {
    /// Decrements the count, blocking while it is zero.
    #[inline(always)]
    pub fn wait(self) -> bool {
        sys_wait(self.0)
    }

    /// Increments the count, waking one blocked waiter if any.
    #[inline(always)]
    pub fn post(self) -> bool {
        sys_post(self.0)
    }
}

/// Requests `bytes` from the kernel's subregion heap. `None` if no size
/// class has a large-enough run free; the returned address is already
/// mapped into the caller's own MPU access window.
#[inline(always)]
pub fn malloc(bytes: u32) -> Option<u32> {
    sys_malloc(bytes)
}

/// Fetches a process-status snapshot into a stack-local table and returns
/// it by value -- there is no heap here to box it into, and
/// [`PsTable`] is small enough (`MAX_PS_ENTRIES` rows) that a copy out is
/// cheap.
pub fn ps() -> PsTable {
    let mut table = PsTable::default();
    let buf = &mut table as *mut PsTable as u32;
    let len = core::mem::size_of::<PsTable>() as u32;
    if let Some(count) = sys_ps(buf, len) {
        table.count = count;
    }
    table
}

/// Looks up a task's pid by its configured name.
#[inline(always)]
pub fn pidof(name: &str) -> Option<Pid> {
    sys_pidof(name)
}

/// Forcibly stops a task, regardless of what it's currently blocked on.
#[inline(always)]
pub fn kill(pid: Pid) -> bool {
    sys_kill(pid)
}

/// Issues the kernel's own first dispatch. Not a way to resume a
/// `Stopped` task -- that's [`restart`], which reallocates its stack.
#[inline(always)]
pub fn start() {
    sys_start()
}

/// Finds a stopped task by name and restarts it from its entry point,
/// reallocating its stack.
#[inline(always)]
pub fn restart(name: &str) -> bool {
    sys_restart(name)
}

/// Changes a task's base priority.
#[inline(always)]
pub fn set_priority(pid: Pid, priority: u8) -> bool {
    sys_set_prio(pid, priority)
}

/// Switches the scheduler between priority-with-round-robin and pure
/// round-robin dispatch.
#[inline(always)]
pub fn schedule_mode(round_robin: bool) {
    sys_sched(round_robin)
}

/// Enables or disables tick-driven preemption, returning whatever the
/// previous setting was. Most callers should reach for a
/// [`critical_section`](crate::critical_section) guard instead of calling
/// this directly, so the previous setting always gets restored.
#[inline(always)]
pub fn preempt(enable: bool) -> bool {
    sys_preempt(enable)
}

/// Requests a hardware reset. Never returns.
#[inline(always)]
pub fn reboot() -> ! {
    sys_reboot()
}
