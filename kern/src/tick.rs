//! System-timer tick processing.
//!
//! Grounded on the original `sysTickIsr` in `kernel.c`: every tick, walk the
//! task table decrementing any `DELAYED` task's remaining count and waking
//! it at zero, then -- every `config::CPU_TIME_SWAP_PERIOD` ticks -- swap
//! every task's CPU-time ping-pong buffer so `PS` can read a stable,
//! non-racing sample (the original's `WTIMER0`-driven accumulator swap).
//!
//! This module only touches `state::Kernel`; it has no idea how the tick
//! interrupt itself is wired up or how often it actually fires -- that's
//! `arch`'s job.

use crate::config::CPU_TIME_SWAP_PERIOD;
use crate::state::Kernel;
use crate::task::TaskState;

/// Advances kernel time by one tick. Returns `true` if the architecture
/// layer should follow this call with a context-switch request.
///
/// A task finishing its sleep always becomes `Ready` immediately, but per
/// the concurrency model's "preemptive-with-cooperative-fallback" design,
/// that alone only forces a switch when tick-driven preemption is enabled
/// (`kernel.preemption_enabled`, toggled by the `PREEMPT` call) -- with
/// preemption disabled, a freshly-woken task is merely eligible and is
/// picked up at the next syscall-driven switch, the same "cooperative
/// fallback" the concurrency model promises rather than instant wakeup.
pub fn handle_tick(kernel: &mut Kernel) -> bool {
    for t in kernel.tasks.tasks.iter_mut() {
        if t.state != TaskState::Delayed {
            continue;
        }
        t.ticks = t.ticks.saturating_sub(1);
        if t.ticks == 0 {
            t.state = TaskState::Ready;
        }
    }

    kernel.swap_counter += 1;
    if kernel.swap_counter >= CPU_TIME_SWAP_PERIOD {
        kernel.swap_counter = 0;
        for t in kernel.tasks.tasks.iter_mut() {
            t.cpu_time.swap();
        }
    }

    kernel.preemption_enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CPU_TIME_SWAP_PERIOD;

    fn delayed(kernel: &mut Kernel, idx: usize, ticks: u32) {
        kernel.tasks.tasks[idx].state = TaskState::Delayed;
        kernel.tasks.tasks[idx].ticks = ticks;
    }

    #[test]
    fn sleeping_task_wakes_when_ticks_reach_zero() {
        let mut kernel = Kernel::new();
        delayed(&mut kernel, 0, 2);
        handle_tick(&mut kernel);
        assert_eq!(kernel.tasks.tasks[0].state, TaskState::Delayed);
        assert_eq!(kernel.tasks.tasks[0].ticks, 1);
        handle_tick(&mut kernel);
        assert_eq!(kernel.tasks.tasks[0].state, TaskState::Ready);
    }

    #[test]
    fn tick_requests_switch_only_when_preemption_enabled() {
        let mut kernel = Kernel::new();
        delayed(&mut kernel, 0, 1);
        assert!(!handle_tick(&mut kernel));

        kernel.preemption_enabled = true;
        delayed(&mut kernel, 0, 1);
        assert!(handle_tick(&mut kernel));
    }

    #[test]
    fn cpu_time_swaps_every_swap_period() {
        let mut kernel = Kernel::new();
        kernel.tasks.tasks[0].cpu_time.add(10);
        assert_eq!(kernel.tasks.tasks[0].cpu_time.inactive(), 0);

        for _ in 0..CPU_TIME_SWAP_PERIOD {
            handle_tick(&mut kernel);
        }
        assert_eq!(kernel.tasks.tasks[0].cpu_time.inactive(), 10);
        assert_eq!(kernel.swap_counter, 0);
    }
}
