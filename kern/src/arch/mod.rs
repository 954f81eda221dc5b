//! Architecture backend selection.
//!
//! The kernel core (`task`, `scheduler`, `sync`, `syscalls`, `mpu`, ...) is
//! ordinary safe Rust and is unit-tested on the host. Everything that
//! actually touches a register -- exception entry points, MPU register
//! pokes, the initial stack frame a fresh task starts from -- lives in
//! exactly one of the two backends selected below, grounded on the
//! teacher's own `arch.rs` (a `cfg_if!` dispatch over `target_arch`),
//! generalized here to fall back to the host backend instead of a hard
//! `compile_error!` so the kernel core's test suite can run without real
//! hardware.
//!
//! Both backends expose the same free-function surface, so `startup` and
//! the rest of the kernel never need to know which one is linked in:
//!
//! - `configure_static_regions()` -- establish the background/flash/dynamic
//!   region layout once at boot.
//! - `reinitialize(entry, stack_top) -> u32` -- build a fresh task's initial
//!   exception frame, returning its starting stack pointer.
//! - `apply_memory_protection(mask)` -- program the four dynamic MPU
//!   regions' SRD fields from a task's `SrdMask`.
//! - `start_first_task(sp) -> !` -- drop privilege and branch into the
//!   first task, never returning.
//! - `klog_write(args)` -- the backing function for the `klog!` macro.

/// Emits a kernel diagnostic line through whichever transport the active
/// `klog-itm`/`klog-semihosting` feature selects, or compiles away to
/// nothing if neither is enabled. Used by `fault::handle_fault` and by the
/// `PS`/`REBOOT` supervisor calls.
///
/// Declared with a bare `macro_rules!` (not `#[macro_export]`) so that
/// `#[macro_use] pub mod arch;` in `lib.rs` -- which names this module
/// before any other -- brings it into scope for every module that follows,
/// matching the teacher's macro placement.
macro_rules! klog {
    ($($arg:tt)*) => {
        $crate::arch::klog_write(core::format_args!($($arg)*))
    };
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        mod arm_m;
        pub use arm_m::*;
    } else {
        mod sim;
        pub use sim::*;
    }
}
