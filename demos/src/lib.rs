//! Task bodies ported from a real preemptive-kernel demo application,
//! exercising the full supervisor-call surface: priority scheduling,
//! mutex-guarded sections, semaphore signalling, dynamic restart/stop/kill,
//! priority changes, `MALLOC`, and (deliberately) a scheduler starvation
//! case and an MPU fault case.
//!
//! Every body here is an ordinary Rust function, not a literal zero-arg
//! entry point -- the LED/button wiring a real board would hardcode is
//! taken as a `&dyn Gpio` parameter instead, and the mutex/semaphore/pid
//! handles a real deployment would configure statically are taken as
//! arguments. A harness (or, on real hardware, a thin per-task shim) picks
//! the wiring and loops the body forever the way every function here
//! expects to be looped.

#![cfg_attr(target_os = "none", no_std)]

// Every item below that touches `hl`/`Mutex`/`Semaphore`/`Gpio` is embedded
// target only: `userlib`'s syscall stubs are raw `svc` inline assembly,
// which a host assembler can't encode. `decode_key_actions` and its enum
// further down have no such dependency and stay host-testable, which is
// the whole reason they were pulled out as standalone functions.
#[cfg(target_os = "none")]
use kern::board::{Gpio, Pin};
#[cfg(target_os = "none")]
use unwrap_lite::UnwrapLite;
#[cfg(target_os = "none")]
use userlib::hl::{self, Mutex, Semaphore};

/// Must always be `Ready` -- the scheduler has nothing else to pick if
/// every other task is blocked or stopped. Blinks `led` briefly once per
/// loop, otherwise just yields.
#[cfg(target_os = "none")]
pub fn idle(gpio: &dyn Gpio, led: Pin) -> ! {
    loop {
        gpio.write(led, true);
        hl::yield_now();
        gpio.write(led, false);
        hl::yield_now();
    }
}

/// Toggles `led` every 125 ticks -- a steady 4 Hz flasher at a 1ms tick
/// period, restartable and stoppable by [`readKeys`] below.
#[cfg(target_os = "none")]
pub fn flash_4hz(gpio: &dyn Gpio, led: Pin) -> ! {
    let mut on = false;
    loop {
        on = !on;
        gpio.write(led, on);
        hl::sleep_for(125);
    }
}

/// Blocked on `flash_req` until a button press posts it, then lights `led`
/// for one second -- a one-shot response to an external event, as opposed
/// to `flash_4hz`'s free-running period.
#[cfg(target_os = "none")]
pub fn oneshot(gpio: &dyn Gpio, led: Pin, flash_req: Semaphore) -> ! {
    loop {
        flash_req.wait();
        gpio.write(led, true);
        hl::sleep_for(1000);
        gpio.write(led, false);
    }
}

/// The chunk of `lengthy_fn`'s busy work that actually yields, so a
/// higher-priority task gets a chance to run mid-loop instead of only at
/// the top.
#[cfg(target_os = "none")]
fn part_of_lengthy_fn() {
    hl::yield_now();
}

/// Holds `resource` for its entire 5000-iteration write loop, yielding
/// partway through each iteration. Demonstrates both `MALLOC` (one
/// allocation up front, reused every pass) and priority-inheritance-bearing
/// mutex contention against [`important`].
#[cfg(target_os = "none")]
pub fn lengthy_fn(gpio: &dyn Gpio, led: Pin, resource: Mutex) -> ! {
    let mem = hl::malloc(5000).unwrap_lite();
    let mem = mem as *mut u8;
    loop {
        resource.lock();
        for i in 0..5000u32 {
            part_of_lengthy_fn();
            unsafe {
                mem.add(i as usize).write_volatile(0);
            }
        }
        gpio.write(led, !read_led(gpio, led));
        resource.unlock();
    }
}

#[cfg(target_os = "none")]
fn read_led(gpio: &dyn Gpio, led: Pin) -> bool {
    gpio.read(led)
}

/// Bitmask decode for a `readPbs`-style "which buttons are down" sample
/// into the handful of dispatch actions `read_keys` takes below. Kept as a
/// standalone pure function so the dispatch table is testable without a
/// running kernel.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KeyAction {
    ToggleYellowAndRed,
    PostFlashReq,
    RestartFlash,
    StopFlash,
    RaiseLengthyFnPriority,
}

/// Decodes a 6-button sample (bit N set means button N+1 is held) into the
/// actions it triggers, in bit order. A sample of zero decodes to no
/// actions.
pub fn decode_key_actions(buttons: u8) -> impl Iterator<Item = KeyAction> {
    const TABLE: [(u8, KeyAction); 5] = [
        (1 << 0, KeyAction::ToggleYellowAndRed),
        (1 << 1, KeyAction::PostFlashReq),
        (1 << 2, KeyAction::RestartFlash),
        (1 << 3, KeyAction::StopFlash),
        (1 << 4, KeyAction::RaiseLengthyFnPriority),
    ];
    TABLE.into_iter().filter(move |&(bit, _)| buttons & bit != 0).map(|(_, action)| action)
}

/// Polls buttons (via a caller-supplied sampler, since the six-pin layout
/// is board-specific and out of scope here) once `key_released` has been
/// posted by [`debounce`], then dispatches on whichever buttons it finds
/// held.
#[cfg(target_os = "none")]
pub fn read_keys(
    gpio: &dyn Gpio,
    yellow: Pin,
    red: Pin,
    key_released: Semaphore,
    key_pressed: Semaphore,
    flash_req: Semaphore,
    flash_task: abi::Pid,
    flash_task_name: &str,
    lengthy_fn_task: abi::Pid,
    sample: impl Fn() -> u8,
) -> ! {
    loop {
        key_released.wait();
        let mut buttons = 0;
        while buttons == 0 {
            buttons = sample();
            hl::yield_now();
        }
        key_pressed.post();
        for action in decode_key_actions(buttons) {
            match action {
                KeyAction::ToggleYellowAndRed => {
                    gpio.write(yellow, !read_led(gpio, yellow));
                    gpio.write(red, true);
                }
                KeyAction::PostFlashReq => {
                    flash_req.post();
                    gpio.write(red, false);
                }
                KeyAction::RestartFlash => {
                    // `flash_4hz` was stopped by `KILL`, which already
                    // freed its stack allocation -- `START` has no input
                    // and can't resurrect it, so this has to go through
                    // `RESTART`, which reallocates.
                    hl::restart(flash_task_name);
                }
                KeyAction::StopFlash => {
                    hl::kill(flash_task);
                }
                KeyAction::RaiseLengthyFnPriority => {
                    hl::set_priority(lengthy_fn_task, 4);
                }
            }
        }
        hl::yield_now();
    }
}

/// Posts `key_released` once ten consecutive 10ms samples all read no
/// buttons held, restarting the count from scratch on any bounce.
#[cfg(target_os = "none")]
pub fn debounce(key_pressed: Semaphore, key_released: Semaphore, sample: impl Fn() -> u8) -> ! {
    loop {
        key_pressed.wait();
        let mut count = 10u8;
        while count != 0 {
            hl::sleep_for(10);
            if sample() == 0 {
                count -= 1;
            } else {
                count = 10;
            }
        }
        key_released.post();
    }
}

/// Spins without ever yielding while a particular button is held,
/// demonstrating that the scheduler's preemption (not a task's own
/// cooperation) is what keeps other tasks alive under this condition.
#[cfg(target_os = "none")]
pub fn uncooperative(sample: impl Fn() -> u8, held_mask: u8) -> ! {
    loop {
        while sample() == held_mask {}
        hl::yield_now();
    }
}

/// Writes through a hardcoded, out-of-window address while a particular
/// button is held -- the MPU fault scenario. This function is expected to
/// fault and never return once the button is pressed.
#[cfg(target_os = "none")]
pub fn errant(sample: impl Fn() -> u8, held_mask: u8) -> ! {
    let p = 0x2000_0000 as *mut u32;
    loop {
        while sample() == held_mask {
            unsafe {
                p.write_volatile(0);
            }
        }
        hl::yield_now();
    }
}

/// Holds `resource` for a flat one-second interval every pass, lighting
/// `led` for the duration -- the low-priority contender against
/// [`lengthy_fn`] for the same mutex.
#[cfg(target_os = "none")]
pub fn important(gpio: &dyn Gpio, led: Pin, resource: Mutex) -> ! {
    loop {
        resource.lock();
        gpio.write(led, true);
        hl::sleep_for(1000);
        gpio.write(led, false);
        resource.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_no_buttons() {
        assert_eq!(decode_key_actions(0).count(), 0);
    }

    #[test]
    fn decode_single_button() {
        let actions: std::vec::Vec<_> = decode_key_actions(0b0000_0100).collect();
        assert_eq!(actions, std::vec![KeyAction::RestartFlash]);
    }

    #[test]
    fn decode_multiple_buttons_in_bit_order() {
        let actions: std::vec::Vec<_> = decode_key_actions(0b0001_0011).collect();
        assert_eq!(
            actions,
            std::vec![
                KeyAction::ToggleYellowAndRed,
                KeyAction::PostFlashReq,
                KeyAction::RaiseLengthyFnPriority,
            ]
        );
    }

    #[test]
    fn decode_ignores_unmapped_high_bits() {
        let actions: std::vec::Vec<_> = decode_key_actions(0b1110_0000).collect();
        assert_eq!(actions.len(), 0);
    }
}
