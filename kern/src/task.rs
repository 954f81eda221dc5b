//! The task control block table.
//!
//! `Task` is deliberately a plain-old-data struct -- every field is a
//! fixed-width integer, small fixed array, or `Copy` enum, so the whole
//! table can live as a `static mut` array touched only from exception
//! context (see `kern::arch`). No `Vec`, no `Box`, no interior mutability
//! beyond what exception-priority mutual exclusion already gives us.

use abi::{Pid, TaskName, TaskState as AbiTaskState};

use crate::config::{MAX_TASKS, NUM_PRIORITIES};
use crate::mpu::SrdMask;

/// Lifecycle state of a task slot. Mirrors `abi::TaskState` (which is the
/// copy a `PS` snapshot actually exposes to user code) but keeps kernel
/// bookkeeping -- which queue a blocked task sits in -- attached to the
/// variant instead of in a side field, so a slot's blocking relationship
/// can never drift out of sync with its headline state.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TaskState {
    /// Slot holds no task. Never scheduled, never reported by `PS`.
    Invalid,
    /// Task exists but is not runnable: freshly killed, or never started.
    Stopped,
    /// Runnable; eligible for the scheduler.
    Ready,
    /// Sleeping; `ticks` counts down to zero in the tick handler.
    Delayed,
    /// Blocked in the waiter queue of `mutex_held`.
    BlockedMutex,
    /// Blocked in the waiter queue of `sem_waiting_on`.
    BlockedSemaphore,
}

impl From<TaskState> for AbiTaskState {
    fn from(s: TaskState) -> AbiTaskState {
        match s {
            TaskState::Invalid => AbiTaskState::Invalid,
            TaskState::Stopped => AbiTaskState::Stopped,
            TaskState::Ready => AbiTaskState::Ready,
            TaskState::Delayed => AbiTaskState::Delayed,
            TaskState::BlockedMutex => AbiTaskState::BlockedMutex,
            TaskState::BlockedSemaphore => AbiTaskState::BlockedSemaphore,
        }
    }
}

/// Two-element buffer used for lock-free(-enough) CPU-time sampling: the
/// tick handler swaps which element is "active" every
/// `config::CPU_TIME_SWAP_PERIOD` ticks, so `PS` can read the inactive one
/// without racing the context-switch handler's increments.
#[derive(Copy, Clone, Default, Debug)]
pub struct CpuTime {
    pub buf: [u32; 2],
    pub active: usize,
}

impl CpuTime {
    pub fn add(&mut self, delta: u32) {
        self.buf[self.active] = self.buf[self.active].wrapping_add(delta);
    }

    pub fn swap(&mut self) {
        let next = 1 - self.active;
        self.buf[next] = 0;
        self.active = next;
    }

    pub fn inactive(&self) -> u32 {
        self.buf[1 - self.active]
    }
}

/// One task control block. See `config` for the array's fixed capacity.
#[derive(Debug)]
pub struct Task {
    pub state: TaskState,
    /// Stable identity: the task's entry-point address. Zero in an
    /// `Invalid` slot. Never interpreted as executable by kernel logic --
    /// it is an opaque handle (see design notes on registers-as-capability
    /// tokens and pid-as-handle).
    pub pid: Pid,
    pub name: TaskName,
    /// Base priority, set at creation or by `SET_PRIO`. 0 is highest.
    pub priority: u8,
    /// Effective priority used by the scheduler. Equal to `priority`
    /// unless boosted by priority inheritance while this task owns a
    /// mutex another, higher-priority task is blocked on.
    pub current_priority: u8,
    pub stack_base: u32,
    pub stack_bytes: u32,
    /// Stack pointer value at creation, before any context switch.
    pub sp_init: u32,
    /// Saved process stack pointer while not running.
    pub sp: u32,
    /// Remaining sleep ticks; meaningful only while `state == Delayed`.
    pub ticks: u32,
    pub srd_mask: SrdMask,
    /// The mutex this task currently owns, or is blocked waiting to
    /// acquire. A task can be party to at most one mutex relationship at
    /// a time in this design -- see `DESIGN.md` for why a single field
    /// suffices instead of separate "owns" and "waits for" slots.
    pub mutex_held: Option<usize>,
    /// The semaphore this task is blocked waiting on. Meaningful only
    /// while `state == BlockedSemaphore`.
    pub sem_waiting_on: Option<usize>,
    pub cpu_time: CpuTime,
}

impl Task {
    pub const EMPTY: Task = Task {
        state: TaskState::Invalid,
        pid: Pid::NONE,
        name: TaskName::EMPTY,
        priority: (NUM_PRIORITIES - 1) as u8,
        current_priority: (NUM_PRIORITIES - 1) as u8,
        stack_base: 0,
        stack_bytes: 0,
        sp_init: 0,
        sp: 0,
        ticks: 0,
        srd_mask: SrdMask::DENY_ALL,
        mutex_held: None,
        sem_waiting_on: None,
        cpu_time: CpuTime {
            buf: [0, 0],
            active: 0,
        },
    };

    pub fn is_ready(&self) -> bool {
        self.state == TaskState::Ready
    }

    /// Resets a slot to its post-kill resting state, keeping identity
    /// (`pid`, `name`) so a later `RESTART` by name can find it, per the
    /// lifecycle note in the data model: "transition to STOPPED on kill
    /// (freeing heap but retaining pid/name for restart)".
    pub fn reset_for_stop(&mut self) {
        self.state = TaskState::Stopped;
        self.current_priority = self.priority;
        self.stack_base = 0;
        self.stack_bytes = 0;
        self.sp_init = 0;
        self.sp = 0;
        self.ticks = 0;
        self.srd_mask = SrdMask::DENY_ALL;
        self.mutex_held = None;
        self.sem_waiting_on = None;
    }
}

/// The fixed task table. One instance exists, owned by the kernel and
/// touched only from exception context; see `kern::arch` for how the
/// naked exception entries expose it to safe code.
pub struct TaskTable {
    pub tasks: [Task; MAX_TASKS],
}

impl TaskTable {
    pub const fn new() -> Self {
        TaskTable {
            tasks: [Task::EMPTY; MAX_TASKS],
        }
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<usize> {
        if pid.is_none() {
            return None;
        }
        self.tasks
            .iter()
            .position(|t| t.state != TaskState::Invalid && t.pid == pid)
    }

    pub fn find_stopped_by_name(&self, name: &TaskName) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.state == TaskState::Stopped && &t.name == name)
    }

    pub fn find_active_by_name(&self, name: &TaskName) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.state != TaskState::Invalid && &t.name == name)
    }

    pub fn find_free_slot(&self) -> Option<usize> {
        self.tasks.iter().position(|t| t.state == TaskState::Invalid)
    }

    /// `PID` uniqueness invariant check used by creation and by tests:
    /// at most one non-invalid slot may carry a given non-zero pid.
    #[cfg(test)]
    pub fn pids_unique(&self) -> bool {
        for i in 0..self.tasks.len() {
            if self.tasks[i].state == TaskState::Invalid || self.tasks[i].pid.is_none() {
                continue;
            }
            for j in (i + 1)..self.tasks.len() {
                if self.tasks[j].state == TaskState::Invalid {
                    continue;
                }
                if self.tasks[i].pid == self.tasks[j].pid {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_has_no_ready_task() {
        let t = TaskTable::new();
        assert!(t.tasks.iter().all(|t| !t.is_ready()));
    }

    #[test]
    fn find_by_pid_skips_invalid_slots() {
        let mut t = TaskTable::new();
        t.tasks[3].state = TaskState::Ready;
        t.tasks[3].pid = Pid(0x2000_0100);
        assert_eq!(t.find_by_pid(Pid(0x2000_0100)), Some(3));
        assert_eq!(t.find_by_pid(Pid(0x2000_0200)), None);
    }

    #[test]
    fn pids_unique_detects_duplicate() {
        let mut t = TaskTable::new();
        t.tasks[0].state = TaskState::Ready;
        t.tasks[0].pid = Pid(0x1000);
        t.tasks[1].state = TaskState::Ready;
        t.tasks[1].pid = Pid(0x1000);
        assert!(!t.pids_unique());
    }
}
