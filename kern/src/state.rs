//! The kernel's one piece of global, exception-context-only state.
//!
//! Hubris itself splits the task table, IRQ table, and current-task
//! pointer into separate globals reached through `arch::with_task_table`.
//! This kernel's state is small enough (and its primitives interlinked
//! enough -- KILL touches the task table, both sync tables, and the heap
//! in one call) that bundling it into a single `Kernel` struct behind one
//! accessor is simpler while keeping the same "exception context only"
//! discipline: nothing outside a supervisor call, tick, or context-switch
//! handler may touch this.

use crate::config::{MAX_MUTEXES, MAX_SEMAPHORES};
use crate::mpu::Heap;
use crate::scheduler::Scheduler;
use crate::sync::{Mutex, Semaphore};
use crate::task::TaskTable;

/// All kernel-owned mutable state, reachable only from exception context.
pub struct Kernel {
    pub tasks: TaskTable,
    pub scheduler: Scheduler,
    pub mutexes: [Mutex; MAX_MUTEXES],
    pub semaphores: [Semaphore; MAX_SEMAPHORES],
    pub heap: Heap,
    /// Index of the currently-running task.
    pub current: usize,
    /// Tick-driven preemption on/off. `PREEMPT` syscall toggles this.
    pub preemption_enabled: bool,
    /// Priority-inheritance boost/restore on mutex contention. Configured
    /// once; not exposed as a syscall (the spec presents it as a global
    /// flag, not a runtime-toggleable primitive).
    pub priority_inheritance: bool,
    /// Ticks elapsed since the last CPU-time ping-pong swap. Reset to 0
    /// every `config::CPU_TIME_SWAP_PERIOD` ticks by `tick::handle_tick`.
    pub swap_counter: u32,
    /// `CpuTimeCounter::now()` sample taken at the last context switch, so
    /// the next switch can compute how long the outgoing task actually ran
    /// (`time::elapsed`). Zero until the first switch.
    pub last_switch_counter: u32,
}

impl Kernel {
    pub const fn new() -> Self {
        Kernel {
            tasks: TaskTable::new(),
            scheduler: Scheduler::new(),
            mutexes: [Mutex::new(); MAX_MUTEXES],
            semaphores: [Semaphore::new(0); MAX_SEMAPHORES],
            heap: Heap::new(),
            current: 0,
            preemption_enabled: false,
            priority_inheritance: false,
            swap_counter: 0,
            last_switch_counter: 0,
        }
    }
}
