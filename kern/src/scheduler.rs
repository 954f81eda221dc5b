//! `pickNext`: priority-with-round-robin, or pure round-robin.
//!
//! Grounded on the original `rtosScheduler()`: scan once for the best
//! (numerically lowest) priority among READY tasks, then rotate a
//! persistent cursor forward from its last position until it lands on a
//! READY task at that priority. The cursor is shared across calls so
//! same-priority tasks get fair rotation instead of the lowest-index task
//! always winning ties.

use crate::config::{self, NUM_PRIORITIES};
use crate::task::{Task, TaskState};

/// Selects between priority-with-round-robin and pure round-robin
/// dispatch. Toggled by the `SCHED` supervisor call.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Mode {
    Priority,
    RoundRobin,
}

pub struct Scheduler {
    mode: Mode,
    /// Index of the last-dispatched task; rotation starts from here + 1.
    cursor: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler {
            mode: Mode::Priority,
            // The scan below starts at `cursor + 1`, so parking the cursor
            // one before slot 0 makes slot 0 the first candidate -- matching
            // the original's `static task = 0xFF` sentinel rather than
            // skipping straight to slot 1 on the very first pick.
            cursor: config::MAX_TASKS - 1,
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Picks the next task to dispatch. Panics if no task in `tasks` is
    /// READY -- per the spec, this is undefined behavior territory and
    /// the system requires an always-ready idle task to avoid it.
    pub fn pick_next(&mut self, tasks: &[Task]) -> usize {
        let n = tasks.len();
        let best_priority = if self.mode == Mode::Priority {
            tasks
                .iter()
                .filter(|t| t.is_ready())
                .map(|t| t.current_priority)
                .min()
        } else {
            None
        };

        for step in 1..=n {
            let idx = (self.cursor + step) % n;
            let t = &tasks[idx];
            if !t.is_ready() {
                continue;
            }
            let matches_priority = match self.mode {
                Mode::Priority => Some(t.current_priority) == best_priority,
                Mode::RoundRobin => true,
            };
            if matches_priority {
                self.cursor = idx;
                return idx;
            }
        }

        panic!("no READY task: scheduler requires an always-ready idle task");
    }
}

static_assertions::const_assert!(NUM_PRIORITIES <= 256);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskTable;

    fn ready(tasks: &mut TaskTable, idx: usize, priority: u8) {
        tasks.tasks[idx].state = TaskState::Ready;
        tasks.tasks[idx].priority = priority;
        tasks.tasks[idx].current_priority = priority;
    }

    #[test]
    fn priority_mode_prefers_lowest_priority_number() {
        let mut tasks = TaskTable::new();
        ready(&mut tasks, 0, 5);
        ready(&mut tasks, 1, 1);
        ready(&mut tasks, 2, 5);
        let mut sched = Scheduler::new();
        assert_eq!(sched.pick_next(&tasks.tasks), 1);
        // Staying ready, task 1 is picked again and again (no other task
        // at priority 1).
        assert_eq!(sched.pick_next(&tasks.tasks), 1);
    }

    #[test]
    fn same_priority_tasks_rotate_fairly() {
        let mut tasks = TaskTable::new();
        ready(&mut tasks, 0, 2);
        ready(&mut tasks, 1, 2);
        ready(&mut tasks, 2, 2);
        let mut sched = Scheduler::new();
        let picks = [
            sched.pick_next(&tasks.tasks),
            sched.pick_next(&tasks.tasks),
            sched.pick_next(&tasks.tasks),
        ];
        assert_eq!(picks, [0, 1, 2]);
    }

    #[test]
    fn round_robin_mode_ignores_priority() {
        let mut tasks = TaskTable::new();
        ready(&mut tasks, 0, 0);
        ready(&mut tasks, 1, 9);
        let mut sched = Scheduler::new();
        sched.set_mode(Mode::RoundRobin);
        assert_eq!(sched.pick_next(&tasks.tasks), 0);
        assert_eq!(sched.pick_next(&tasks.tasks), 1);
        assert_eq!(sched.pick_next(&tasks.tasks), 0);
    }

    #[test]
    #[should_panic]
    fn no_ready_task_panics() {
        let tasks = TaskTable::new();
        let mut sched = Scheduler::new();
        sched.pick_next(&tasks.tasks);
    }
}
