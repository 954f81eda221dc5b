//! Wire types shared between the kernel and task code: supervisor-call
//! numbers, the process-status snapshot record, and the task name/pid
//! types that appear in supervisor-call arguments and results.
//!
//! This crate carries no kernel logic. Anything that a task links against
//! to talk to the kernel, and that the kernel also needs to interpret
//! calls, lives here so the two sides can't drift out of sync.

#![no_std]

use core::convert::TryFrom;

/// Maximum length of a task name, not including the implicit NUL
/// terminator used to find the printable extent of the fixed buffer.
pub const MAX_TASK_NAME_LEN: usize = 15;

/// A task name is a fixed byte buffer, never a heap-allocated string --
/// the kernel has no allocator available to itself.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct TaskName([u8; MAX_TASK_NAME_LEN + 1]);

impl TaskName {
    pub const EMPTY: TaskName = TaskName([0; MAX_TASK_NAME_LEN + 1]);

    /// Builds a name from a byte slice, truncating to `MAX_TASK_NAME_LEN`
    /// and NUL-terminating the result.
    pub fn new(bytes: &[u8]) -> Self {
        let mut buf = [0u8; MAX_TASK_NAME_LEN + 1];
        let n = bytes.len().min(MAX_TASK_NAME_LEN);
        buf[..n].copy_from_slice(&bytes[..n]);
        TaskName(buf)
    }

    /// The name's bytes up to (not including) the first NUL.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        &self.0[..len]
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(self.as_bytes()).unwrap_or("")
    }
}

impl core::fmt::Debug for TaskName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task's stable identity. Per the kernel's design, a pid is the task
/// entry-point address, made unique by construction (no two task slots may
/// share an entry function) and treated everywhere as an opaque handle --
/// it is never dereferenced as code by kernel or task logic.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Pid(pub u32);

impl Pid {
    /// The sentinel pid returned by `PIDOF` when no task matches.
    pub const NONE: Pid = Pid(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Debug for Pid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Pid({:#010x})", self.0)
    }
}

/// The sixteen supervisor calls a task may issue, and their call numbers.
/// The call number is passed as the immediate operand of the SVC
/// instruction itself, not in a register -- the dispatcher recovers it
/// from the stacked instruction per §6.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum Syscall {
    Start = 0,
    Restart = 1,
    SetPrio = 2,
    Yield = 3,
    Sleep = 4,
    Lock = 5,
    Unlock = 6,
    Wait = 7,
    Post = 8,
    Malloc = 9,
    Reboot = 10,
    Ps = 11,
    Kill = 12,
    Preempt = 13,
    Sched = 14,
    PidOf = 15,
}

/// Error returned when an SVC immediate operand doesn't correspond to a
/// known call. The dispatcher treats this as a usage fault on the caller.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct BadSyscall(pub u32);

impl TryFrom<u32> for Syscall {
    type Error = BadSyscall;

    fn try_from(n: u32) -> Result<Self, BadSyscall> {
        use Syscall::*;
        Ok(match n {
            0 => Start,
            1 => Restart,
            2 => SetPrio,
            3 => Yield,
            4 => Sleep,
            5 => Lock,
            6 => Unlock,
            7 => Wait,
            8 => Post,
            9 => Malloc,
            10 => Reboot,
            11 => Ps,
            12 => Kill,
            13 => Preempt,
            14 => Sched,
            15 => PidOf,
            other => return Err(BadSyscall(other)),
        })
    }
}

/// The lifecycle states a task slot can be in. Mirrors the kernel's
/// internal `TaskState` one-for-one; kept here too because `PS` reports it
/// to user code.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum TaskState {
    Invalid = 0,
    Stopped = 1,
    Ready = 2,
    Delayed = 3,
    BlockedMutex = 4,
    BlockedSemaphore = 5,
}

/// One row of the process-status snapshot produced by the `PS` call.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct PsEntry {
    pub pid: Pid,
    pub name: TaskName,
    pub priority: u8,
    pub state: TaskState,
    pub cpu_time: u32,
}

impl PsEntry {
    pub const EMPTY: PsEntry = PsEntry {
        pid: Pid::NONE,
        name: TaskName::EMPTY,
        priority: 0,
        state: TaskState::Invalid,
        cpu_time: 0,
    };
}

/// Upper bound on how many rows a `PS` snapshot may contain, shared with
/// the kernel's `MAX_TASKS` so the caller's buffer can be sized statically.
/// Kept in sync with `kern::config::MAX_TASKS` by a `static_assertions`
/// check in that module.
pub const MAX_PS_ENTRIES: usize = 16;

/// System-timer tick period, in milliseconds. A task converting a duration
/// to a `SLEEP` tick count needs this value too, so it lives here rather
/// than solely in `kern::config` -- kept in sync with
/// `kern::config::TICK_PERIOD_MS` by a `static_assertions` check there.
pub const TICK_PERIOD_MS: u32 = 1;

/// Fixed-size table written into the caller's buffer by `PS`. Never heap
/// allocated -- a plain array of entries, the unused tail left `EMPTY`.
#[repr(C)]
pub struct PsTable {
    pub entries: [PsEntry; MAX_PS_ENTRIES],
    pub count: u32,
}

impl Default for PsTable {
    fn default() -> Self {
        PsTable {
            entries: [PsEntry::EMPTY; MAX_PS_ENTRIES],
            count: 0,
        }
    }
}

/// Sentinel values a supervisor call may return in its result register.
/// No structured error type crosses the call boundary -- per the design,
/// kernel primitives report failure via a sentinel, never an exception.
pub mod sentinel {
    /// Returned by calls that hand back a pointer-like value (`MALLOC`,
    /// `PIDOF`) when the operation failed or found nothing.
    pub const NONE: u32 = 0;
}
