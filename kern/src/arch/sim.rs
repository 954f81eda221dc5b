//! Host architecture backend: everything `arm_m` does for real hardware,
//! done with plain data instead of registers, so the kernel core's test
//! suite can exercise the same `arch` surface `startup` and the exception
//! handlers call through.
//!
//! This backend is never linked into a firmware image -- `arch::mod`
//! selects it only when `target_arch != "arm"`, which in practice means
//! `cargo test` running on the host, where `std` is available (the crate's
//! `no_std` is gated on `target_os = "none"`, which a host test build isn't).

use std::sync::atomic::{AtomicU32, Ordering};

use crate::board::{Console, Gpio, Pin, Port};
use crate::mpu::SrdMask;
use crate::time::CpuTimeCounter;

/// Last mask `apply_memory_protection` was handed, for tests that want to
/// assert a switch actually reprogrammed the MPU view.
static LAST_MASK: AtomicU32 = AtomicU32::new(0);

fn pack(mask: SrdMask) -> u32 {
    u32::from_le_bytes(mask.0)
}

pub fn configure_static_regions() {
    // No real MPU to program; nothing to do.
}

/// Builds a fake initial stack pointer. Real hardware needs a full
/// synthetic exception frame here (see `arm_m::reinitialize`); the host
/// backend only needs a distinct, stable value tests can tell apart from
/// `stack_top`, since nothing ever actually branches through it on this
/// backend.
pub fn reinitialize(_entry: extern "C" fn() -> !, stack_top: u32) -> u32 {
    stack_top.saturating_sub(32)
}

pub fn apply_memory_protection(mask: SrdMask) {
    LAST_MASK.store(pack(mask), Ordering::Relaxed);
}

/// Returns the mask most recently passed to `apply_memory_protection`, as
/// the four raw bytes. Test-only; there is no hardware MPU to read back on
/// this backend.
#[cfg(test)]
pub fn last_applied_mask() -> SrdMask {
    SrdMask(LAST_MASK.load(Ordering::Relaxed).to_le_bytes())
}

/// Never actually reached by the kernel's own test suite, which drives
/// `syscalls::dispatch`/`tick::handle_tick`/`startup::handle_switch`
/// directly rather than booting through `cold_boot`. Kept so
/// `startup::cold_boot` still type-checks identically on both backends.
pub fn start_first_task(_sp: u32) -> ! {
    unreachable!("the host backend never actually starts a task; tests drive the kernel directly")
}

pub fn klog_write(args: core::fmt::Arguments<'_>) {
    eprintln!("{args}");
}

/// A monotonically-incrementing stand-in for the real hardware cycle
/// counter `arm_m` reads off `DWT::CYCCNT`. Each call advances by a fixed
/// step so `time::elapsed` has something non-zero to compute over.
pub struct SimClock {
    ticks: AtomicU32,
}

impl SimClock {
    pub const fn new() -> Self {
        SimClock { ticks: AtomicU32::new(0) }
    }
}

impl CpuTimeCounter for SimClock {
    fn now(&self) -> u32 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }
}

/// A `Console` that buffers everything written to it instead of talking to
/// a UART -- enough for `demos`/tests to exercise the trait without a real
/// transport, per the narrow-external-collaborator design.
pub struct SimConsole {
    buf: std::sync::Mutex<std::vec::Vec<u8>>,
}

impl SimConsole {
    pub fn new() -> Self {
        SimConsole { buf: std::sync::Mutex::new(std::vec::Vec::new()) }
    }

    #[cfg(test)]
    pub fn written(&self) -> std::vec::Vec<u8> {
        self.buf.lock().unwrap().clone()
    }
}

impl Console for SimConsole {
    fn puts(&self, s: &str) {
        self.buf.lock().unwrap().extend_from_slice(s.as_bytes());
    }

    fn kbhit(&self) -> bool {
        false
    }

    fn gets(&self, _buf: &mut [u8]) -> usize {
        0
    }
}

/// A `Gpio` that just remembers the last state written to each of a small
/// fixed set of pins -- enough for `demos` to exercise the trait's shape.
pub struct SimGpio {
    pins: std::sync::Mutex<[bool; 32]>,
}

impl SimGpio {
    pub fn new() -> Self {
        SimGpio { pins: std::sync::Mutex::new([false; 32]) }
    }
}

impl Gpio for SimGpio {
    fn enable_port(&self, _port: Port) {}

    fn set_output(&self, _pin: Pin) {}

    fn set_input(&self, _pin: Pin) {}

    fn read(&self, pin: Pin) -> bool {
        self.pins.lock().unwrap()[pin.0 as usize % 32]
    }

    fn write(&self, pin: Pin, val: bool) {
        self.pins.lock().unwrap()[pin.0 as usize % 32] = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_memory_protection_records_last_mask() {
        let mut mask = SrdMask::DENY_ALL;
        mask.grant_range(0, 3);
        apply_memory_protection(mask);
        assert_eq!(last_applied_mask(), mask);
    }

    #[test]
    fn sim_console_buffers_writes() {
        let console = SimConsole::new();
        console.puts("hello");
        assert_eq!(console.written(), b"hello");
    }

    #[test]
    fn sim_gpio_read_back_matches_last_write() {
        let gpio = SimGpio::new();
        gpio.write(Pin(3), true);
        assert!(gpio.read(Pin(3)));
        gpio.write(Pin(3), false);
        assert!(!gpio.read(Pin(3)));
    }

    #[test]
    fn sim_clock_advances_monotonically() {
        let clock = SimClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b > a);
    }
}
