//! The compiled-in task list.
//!
//! There is no dynamic task loading (`spec.md` Non-goals): a board crate
//! builds a `&'static [TaskSpec]` naming every task that should exist at
//! boot, and `startup::cold_boot` walks it once to populate the task
//! table. A `TaskSpec` only ever describes a task's *static* properties --
//! its entry point, name, starting priority, and how much stack it needs.
//! Everything else (pid, stack pointer, SRD mask) is computed at boot.

use abi::TaskName;

/// One task's boot-time description. `entry` must never return; the
/// architecture layer's initial stack frame points `LR`/`PC` at it
/// directly with no wrapper, so returning from it is undefined.
#[derive(Copy, Clone)]
pub struct TaskSpec {
    pub name: TaskName,
    pub entry: extern "C" fn() -> !,
    pub priority: u8,
    pub stack_bytes: u32,
}

/// The full set of tasks a board brings up at cold boot.
pub type AppTasks = &'static [TaskSpec];
