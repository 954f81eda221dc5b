//! User-task support library.
//!
//! Links into every unprivileged task and provides the two layers a task
//! actually touches:
//!
//! - `sys_*`: one stub per supervisor call (`abi::Syscall`), each a single
//!   `svc` instruction with the call number baked in as the instruction's
//!   own immediate operand (per `spec.md` §6 -- the number never travels in
//!   a register) and up to two word arguments passed in `r0`/`r1`, which is
//!   all any call in this ABI ever needs. A task never issues `svc`
//!   directly; it goes through one of these.
//! - `hl`: ergonomic wrappers a task body actually wants to call --
//!   `hl::sleep_ticks`, `hl::lock`, `hl::malloc`, and so on -- built on top
//!   of the stubs.
//!
//! # Why no naked per-call stubs
//!
//! A message-passing ABI with many arguments needs a dedicated naked
//! `asm!` stub per call to control exactly which registers carry what (the
//! approach a richer IPC-style userlib takes). This ABI never needs more
//! than two word arguments and never returns more than one word (`PS`'s
//! count and `MALLOC`'s address are both plain `u32`s), so a single
//! `svc::<N>` helper generic over the call number as a `const` parameter
//! covers every call -- there's nothing left for a naked function to buy
//! here. See `DESIGN.md` for the fuller comparison.

#![cfg_attr(target_os = "none", no_std)]

// The `svc`/`sys_*` stubs below are raw inline assembly encoding an
// M-profile `svc` instruction; a host assembler has no such mnemonic. Both
// this module tree and the crate-root stubs it calls into are embedded-
// target only so that `demos`, which depends on this crate unconditionally
// and runs some of its own tests on the host, still gets a crate that
// compiles there -- just an empty one.
#[cfg(target_os = "none")]
pub mod critical_section;
#[cfg(target_os = "none")]
pub mod hl;

pub use abi::*;

#[cfg(target_os = "none")]
use core::arch::asm;

/// The panic handler every task binary linking this crate gets for free.
///
/// The teacher's own userlib routes a panic through a dedicated `PANIC`
/// kernel call carrying a truncated message. This ABI has no such call --
/// §4.4's sixteen primitives don't include one, and a task has no portable
/// way to learn its own pid to hand to `KILL` either. The only thing left
/// that a task can always do for itself is stop making progress, the same
/// "exiting a task is undefined, tasks run an infinite loop" contract
/// `spec.md` §6 already gives task bodies generally -- so a panicking task
/// spins forever rather than returning, matching `sys_reboot`'s own
/// can't-happen fallback loop below. It remains visible in a `PS` snapshot
/// and killable from outside by `KILL` or by the MPU if it touches memory
/// it was never granted.
///
/// Only defined for the embedded target: `demos` depends on this crate
/// unconditionally and runs some of its own tests on the host, where `std`
/// already owns the `panic_impl` lang item and a second definition here
/// would be a duplicate-lang-item build failure.
#[cfg(target_os = "none")]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Issues `svc #{N}` with `a0`/`a1` in `r0`/`r1`, returning whatever the
/// kernel wrote back into `r0`. `N` is a `const` generic, not a runtime
/// parameter, because the SVC immediate is part of the instruction
/// encoding itself and has to be known to the assembler, not just to Rust.
#[cfg(target_os = "none")]
#[inline(always)]
unsafe fn svc<const N: u32>(a0: u32, a1: u32) -> u32 {
    let ret: u32;
    unsafe {
        asm!(
            "svc {n}",
            n = const N,
            inlateout("r0") a0 => ret,
            in("r1") a1,
            options(nostack, preserves_flags),
        );
    }
    ret
}

/// `status(...)`'s inverse on the task side: the dispatcher writes back 0
/// for success and 1 for any of the `KernelError` variants (§7's sentinel
/// propagation policy -- no structured error crosses the boundary).
#[cfg(target_os = "none")]
#[inline(always)]
fn ok(raw: u32) -> bool {
    raw == 0
}

/// `START`. Takes no input (§4.4) -- it is the kernel's own first
/// dispatch, not a way to resurrect a `Stopped` task by pid. Reviving a
/// stopped task is `RESTART`'s job, which reallocates its stack.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_start() {
    unsafe {
        svc::<{ Syscall::Start as u32 }>(0, 0);
    }
}

/// `RESTART`. Finds a stopped task by name, reallocates its stack, and
/// marks it `Ready`. `name`'s bytes are read directly out of the caller's
/// own memory by the kernel -- no local copy needed here.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_restart(name: &str) -> bool {
    ok(unsafe { svc::<{ Syscall::Restart as u32 }>(name.as_ptr() as u32, name.len() as u32) })
}

/// `SET_PRIO`. `false` if `pid` is unknown or `priority` is out of range.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_set_prio(pid: Pid, priority: u8) -> bool {
    ok(unsafe { svc::<{ Syscall::SetPrio as u32 }>(pid.0, priority as u32) })
}

/// `YIELD`. Requests a context switch; the caller resumes whenever the
/// scheduler next picks it.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_yield() {
    unsafe {
        svc::<{ Syscall::Yield as u32 }>(0, 0);
    }
}

/// `SLEEP`. Blocks the caller for at least `ticks` system-timer ticks.
/// `ticks == 0` is a same-tick no-op switch request (still yields once).
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_sleep(ticks: u32) {
    unsafe {
        svc::<{ Syscall::Sleep as u32 }>(ticks, 0);
    }
}

/// `LOCK`. `false` only if `mutex` doesn't name a valid mutex slot or its
/// waiter queue is full; otherwise the caller either now owns the mutex or
/// has been enqueued and is blocked.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_lock(mutex: usize) -> bool {
    ok(unsafe { svc::<{ Syscall::Lock as u32 }>(mutex as u32, 0) })
}

/// `UNLOCK`. `false` if `mutex` is invalid or the caller doesn't own it --
/// per the documented contract, a non-owner unlock is otherwise silently
/// ignored by the kernel, not surfaced as a panic here.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_unlock(mutex: usize) -> bool {
    ok(unsafe { svc::<{ Syscall::Unlock as u32 }>(mutex as u32, 0) })
}

/// `WAIT`. `false` only if `sem` is invalid or its waiter queue is full.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_wait(sem: usize) -> bool {
    ok(unsafe { svc::<{ Syscall::Wait as u32 }>(sem as u32, 0) })
}

/// `POST`. `false` only if `sem` is invalid.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_post(sem: usize) -> bool {
    ok(unsafe { svc::<{ Syscall::Post as u32 }>(sem as u32, 0) })
}

/// `MALLOC`. Returns the base address of a fresh allocation out of the
/// subregion heap, already added to the caller's own access window, or
/// `None` if no class has a large-enough contiguous run free.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_malloc(bytes: u32) -> Option<u32> {
    match unsafe { svc::<{ Syscall::Malloc as u32 }>(bytes, 0) } {
        sentinel::NONE => None,
        addr => Some(addr),
    }
}

/// `REBOOT`. Never returns: the kernel writes the hardware reset-request
/// register and the caller's timeslice simply never resumes.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_reboot() -> ! {
    unsafe {
        svc::<{ Syscall::Reboot as u32 }>(0, 0);
    }
    loop {
        core::hint::spin_loop();
    }
}

/// `PS`. Writes the process-status snapshot into `buf`/`len` (a pointer
/// into the caller's own memory); returns the number of rows written, or
/// `None` if the destination range failed the caller's own access check.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_ps(buf: u32, len: u32) -> Option<u32> {
    match unsafe { svc::<{ Syscall::Ps as u32 }>(buf, len) } {
        sentinel::NONE => None,
        count => Some(count),
    }
}

/// `KILL`. `false` if `pid` is unknown.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_kill(pid: Pid) -> bool {
    ok(unsafe { svc::<{ Syscall::Kill as u32 }>(pid.0, 0) })
}

/// `PREEMPT`. Returns the *previous* setting, so callers can nest
/// disable/restore pairs correctly -- this is exactly what
/// `critical_section` below relies on.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_preempt(enable: bool) -> bool {
    unsafe { svc::<{ Syscall::Preempt as u32 }>(enable as u32, 0) != 0 }
}

/// `SCHED`. Chooses priority-with-round-robin (`round_robin = false`) or
/// pure round-robin (`true`) dispatch.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_sched(round_robin: bool) {
    unsafe {
        svc::<{ Syscall::Sched as u32 }>(round_robin as u32, 0);
    }
}

/// `PIDOF`. `None` if no active task has this name.
#[cfg(target_os = "none")]
#[inline(always)]
pub fn sys_pidof(name: &str) -> Option<Pid> {
    match unsafe { svc::<{ Syscall::PidOf as u32 }>(name.as_ptr() as u32, name.len() as u32) } {
        sentinel::NONE => None,
        raw => Some(Pid(raw)),
    }
}
