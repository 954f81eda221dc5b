//! Cortex-M (ARMv7-M/ARMv8-M) architecture backend: exception entry points,
//! MPU register programming, and the initial stack frame a freshly created
//! task starts running from.
//!
//! Grounded on the teacher's `arch::arm_m`: the same three-exception split
//! (`SVCall` does the work that can't wait, `SysTick` maintains kernel time
//! and only *requests* a switch, `PendSV` is where the actual register
//! save/restore happens) and the same `global_asm!`-plus-safe-Rust-callback
//! structure the newer snapshot of the teacher's kernel uses for its
//! exception trampolines.
//!
//! Unlike the teacher, `SVCall` here never needs to save `r4-r11`: this
//! kernel's SVC ABI only ever needs `r0-r3` (already auto-stacked by the
//! exception entry) and a compile-time-constant call number carried in the
//! `svc` instruction's own immediate operand (`spec.md` §6), so there is
//! nothing callee-saved to protect. Only `PendSV` -- which runs whenever a
//! syscall, tick, or fault actually changes which task is current -- does
//! the full register push/pop, straight onto the outgoing/incoming task's
//! own process stack, per the context-switch pipeline's literal
//! "push onto the outgoing process stack" contract.

use core::arch::{asm, global_asm};

use cortex_m::peripheral::{MPU, SCB};

use crate::board::Timing;
use crate::config::TICK_PERIOD_MS;
use crate::err::FaultKind;
use crate::mpu::{self, SrdMask};
use crate::startup;
use crate::syscalls::CallFrame;
use crate::time::CpuTimeCounter;

include!(concat!(env!("OUT_DIR"), "/consts.rs"));

/// Clock rate assumed for the SysTick reload computation, matching the
/// original's 40 MHz part (`NVIC_ST_RELOAD_R = 40000 - 1` at 1 kHz).
const CLOCK_HZ: u32 = 40_000_000;

/// Bytes per dynamic MPU region: four regions of 8 KiB, 1 KiB per
/// subregion. This is a uniform hardware layout chosen for simplicity; it
/// doesn't line up byte-for-byte with the heap's irregular 512 B/1.5 KiB/
/// 1 KiB size classes at every class boundary (see `mpu`'s module doc for
/// the same tension in the original C design's 4K1/8K1/8K2/8K3 regions) --
/// enforcement is still exact at the subregion-index granularity `mpu`
/// itself reasons in, which is what `umem`'s access checks rely on.
const REGION_BYTES: u32 = 8192;

const FLASH_BASE: u32 = 0x0800_0000;
const FLASH_SIZE_L2: u32 = 20; // 1 MiB

fn region_rasr(size_l2: u32, srd: u8, ap: u32, xn: bool) -> u32 {
    const TEX: u32 = 0b001;
    const SCB_BITS: u32 = 0b111;
    (xn as u32) << 28 | ap << 24 | TEX << 19 | SCB_BITS << 16 | (srd as u32) << 8 | size_l2 << 1 | 1
}

pub fn configure_static_regions() {
    let mpu = unsafe { &*MPU::PTR };
    unsafe {
        mpu.ctrl.write(0);

        // Region 4: whole address space, background, privileged-only RW.
        // Every task's SrdMask starts as SrdMask::DENY_ALL, so this is what
        // actually enforces "no access" until a dynamic region grants a
        // specific window -- see `mpu::SrdMask`'s doc comment.
        mpu.rnr.write(4);
        mpu.rbar.write(4 | (1 << 4));
        mpu.rasr.write(region_rasr(31, 0x00, 0b001, false));

        // Region 5: flash, read+execute, any privilege level.
        mpu.rnr.write(5);
        mpu.rbar.write(5 | (1 << 4) | FLASH_BASE);
        mpu.rasr.write(region_rasr(FLASH_SIZE_L2, 0x00, 0b010, false));

        // Regions 0-3: the four dynamic SRAM windows. SRD starts at all-1
        // (deny); `apply_memory_protection` fills it in per task on every
        // switch.
        let region_size_l2 = 31 - REGION_BYTES.leading_zeros();
        for i in 0..mpu::DYNAMIC_REGION_COUNT as u32 {
            let base = mpu::ARENA_BASE + i * REGION_BYTES;
            mpu.rnr.write(i);
            mpu.rbar.write(i | (1 << 4) | base);
            mpu.rasr.write(region_rasr(region_size_l2, 0xFF, 0b011, false));
        }

        const ENABLE: u32 = 0b001;
        const PRIVDEFENA: u32 = 0b100;
        mpu.ctrl.write(ENABLE | PRIVDEFENA);
    }
}

/// Reprograms the four dynamic regions' SRD fields from `mask`. Called by
/// `pendsv_switch` on every context switch, so by the time the incoming
/// task actually resumes its memory window is already correct.
pub fn apply_memory_protection(mask: SrdMask) {
    let mpu = unsafe { &*MPU::PTR };
    for i in 0..mpu::DYNAMIC_REGION_COUNT as u32 {
        unsafe {
            mpu.rnr.write(i);
            let rasr = mpu.rasr.read();
            let srd = mask.0[i as usize] as u32;
            mpu.rasr.write((rasr & !(0xFF << 8)) | (srd << 8));
        }
    }
}

/// Builds the initial stack contents for a task that has never run: the
/// `r4-r11`/`EXC_RETURN` block `PendSV` would have pushed on a real switch
/// (all zero, plus the one `EXC_RETURN` value every task in this kernel
/// ever uses, since floating-point context is never saved), immediately
/// below a synthetic hardware exception frame pointing at `entry` with the
/// Thumb bit set in `xPSR`. The result is indistinguishable, to `PendSV`'s
/// pop sequence, from a task that blocked on its own stack a moment ago.
pub fn reinitialize(entry: extern "C" fn() -> !, stack_top: u32) -> u32 {
    const FRAME_WORDS: u32 = 17; // 9 (r4-r11, exc_return) + 8 (hw frame)
    let sp = stack_top - FRAME_WORDS * 4;

    unsafe {
        let mut p = sp as *mut u32;
        for _ in 0..8 {
            // r4-r11
            p.write_volatile(0);
            p = p.add(1);
        }
        p.write_volatile(EXC_RETURN_CONST);
        p = p.add(1);
        for _ in 0..4 {
            // r0-r3
            p.write_volatile(0);
            p = p.add(1);
        }
        p.write_volatile(0); // r12
        p = p.add(1);
        p.write_volatile(0xFFFF_FFFF); // lr: `entry` must never return
        p = p.add(1);
        p.write_volatile(entry as usize as u32); // pc
        p = p.add(1);
        p.write_volatile(0x0100_0000); // xPSR: Thumb bit set
    }

    sp
}

/// Performs the one-time privileged setup (fault/exception priorities,
/// SysTick, the MPU's global enable) and then drops into the first task,
/// never returning.
///
/// Grounded on the teacher's `start_first_task`: the only way to flip from
/// Thread mode (where `cold_boot` runs) into Handler mode so a `bx lr` with
/// a manufactured `EXC_RETURN` can perform the processor-mode switch is to
/// trap there, via `SVCall` itself -- recognized as the startup case by
/// `SVCall`'s own LR inspection, not dispatched as an ordinary syscall.
pub fn start_first_task(sp: u32) -> ! {
    unsafe {
        let scb = &*SCB::PTR;
        // Faults on: this distinguishes MemManage/BusFault/UsageFault from
        // HardFault.
        scb.shcsr.modify(|x| x | 0b111 << 16);
        // Usage/Bus/MemManage at the highest configurable priority, so a
        // fault inside the kernel itself is still visible as such.
        scb.shpr[0].write(0x00);
        scb.shpr[1].write(0x00);
        scb.shpr[2].write(0x00);
        // SVCall, PendSV, SysTick at the lowest: the kernel's own exception
        // handlers never preempt each other.
        scb.shpr[7].write(0xFF);
        scb.shpr[10].write(0xFF);
        scb.shpr[11].write(0xFF);

        const DIV_0_TRP: u32 = 1 << 4;
        scb.ccr.modify(|x| x | DIV_0_TRP);

        let nvic = &*cortex_m::peripheral::NVIC::PTR;
        let icb = &*cortex_m::peripheral::ICB::PTR;
        let ictr = icb.ictr.read();
        let irq_count = ((ictr as usize & 0xF) + 1) * 32;
        for i in 0..irq_count {
            nvic.ipr[i].write(0xFFu8);
        }

        let syst = &*cortex_m::peripheral::SYST::PTR;
        syst.rvr.write(CLOCK_HZ / 1000 * TICK_PERIOD_MS - 1);
        syst.cvr.write(0);
        syst.csr.modify(|v| v | 0b111);

        // DWT::CYCCNT backs `CycleCounter`, the `CpuTimeCounter` impl below.
        let dwt = &*cortex_m::peripheral::DWT::PTR;
        let dcb = &*cortex_m::peripheral::DCB::PTR;
        dcb.demcr.modify(|v| v | (1 << 24)); // TRCENA
        dwt.cyccnt.write(0);
        dwt.ctrl.modify(|v| v | 1); // CYCCNTENA

        let mpu = &*MPU::PTR;
        const ENABLE: u32 = 0b001;
        const PRIVDEFENA: u32 = 0b100;
        mpu.ctrl.write(ENABLE | PRIVDEFENA);
    }

    unsafe {
        // Point PSP at the hardware frame `reinitialize` built (skipping
        // past the manufactured r4-r11/exc_return block), then load r4-r11
        // from that same block into the real registers -- the same state
        // `PendSV`'s pop sequence would establish on an ordinary switch.
        cortex_m::register::psp::write(sp + 9 * 4);
        asm!(
            "ldm {sp}, {{r4-r11}}",
            "svc #0",
            sp = in(reg) sp,
            options(noreturn),
        )
    }
}

global_asm! {"
    .section .text.SVCall
    .globl SVCall
    .type SVCall,function
    SVCall:
        @ Inspect LR to tell a startup trap (Thread mode, Main stack) from
        @ an ordinary syscall (Thread mode, Process stack).
        mov r0, lr
        mov r1, #0xFFFFFFF3
        bic r0, r1
        cmp r0, #0x8
        beq 1f

        mrs r0, psp
        bl syscall_entry
        bx lr

    1:  @ First task startup: drop privilege, then fake an exception return
        @ into Thread mode + PSP using the EXC_RETURN this kernel always
        @ uses (no per-task FPU state, so one constant suffices for every
        @ task, forever, not just this first entry).
        movs r0, #1
        msr CONTROL, r0
        isb
        mov lr, {exc_return}
        bx lr
    ",
    exc_return = const EXC_RETURN_CONST,
}

/// `SVCall`'s narrow view of the stacked exception frame: `r0-r3` sit at
/// the base of the hardware-saved frame at `psp`, in order, and `r0`'s slot
/// doubles as the return-value register a task reads after `SVCall`
/// returns -- exactly the `CallFrame` contract `syscalls::dispatch` needs.
struct StackedFrame {
    psp: u32,
}

impl CallFrame for StackedFrame {
    fn arg(&self, n: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.psp + n as u32 * 4) as *const u32) }
    }

    fn set_return(&mut self, value: u32) {
        unsafe { core::ptr::write_volatile(self.psp as *mut u32, value) }
    }
}

/// Recovers the SVC call number from the immediate operand of the `svc`
/// instruction itself, per `spec.md` §6: the stacked `pc` points just past
/// the 16-bit Thumb `svc` encoding, whose low byte is the immediate.
unsafe fn read_svc_immediate(psp: u32) -> u32 {
    let pc = core::ptr::read_volatile((psp + 6 * 4) as *const u32);
    let instr = core::ptr::read_volatile((pc - 2) as *const u16);
    (instr & 0xFF) as u32
}

#[no_mangle]
unsafe extern "C" fn syscall_entry(psp: u32) {
    let svc_number = read_svc_immediate(psp);
    let mut frame = StackedFrame { psp };
    match startup::handle_svc(svc_number, &mut frame) {
        crate::syscalls::Disposition::Continue => {}
        crate::syscalls::Disposition::SwitchNeeded => pend_context_switch(),
        crate::syscalls::Disposition::Reboot => reboot(),
        crate::syscalls::Disposition::Fault(kind) => {
            if startup::handle_fault(kind) {
                pend_context_switch();
            } else {
                halt();
            }
        }
    }
}

fn pend_context_switch() {
    const PENDSVSET: u32 = 1 << 28;
    unsafe {
        (&*SCB::PTR).icsr.write(PENDSVSET);
    }
}

fn reboot() -> ! {
    const VECTKEY: u32 = 0x05FA << 16;
    const SYSRESETREQ: u32 = 1 << 2;
    unsafe {
        (&*SCB::PTR).aircr.write(VECTKEY | SYSRESETREQ);
    }
    loop {
        cortex_m::asm::nop();
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    if startup::handle_tick() {
        pend_context_switch();
    }
}

global_asm! {"
    .section .text.PendSV
    .globl PendSV
    .type PendSV,function
    PendSV:
        mrs r0, psp
        stmdb r0!, {{r4-r11, lr}}
        bl pendsv_switch
        ldmia r0!, {{r4-r11, lr}}
        msr psp, r0
        bx lr
    ",
}

#[no_mangle]
unsafe extern "C" fn pendsv_switch(old_psp: u32) -> u32 {
    startup::handle_switch(old_psp, CycleCounter.now())
}

/// `CpuTimeCounter` backed by the real free-running cycle counter, enabled
/// once in `start_first_task`.
struct CycleCounter;

impl CpuTimeCounter for CycleCounter {
    fn now(&self) -> u32 {
        unsafe { (&*cortex_m::peripheral::DWT::PTR).cyccnt.read() }
    }
}

bitflags::bitflags! {
    /// Bits of the Memory Management Fault Status Register (the low byte
    /// of `CFSR`).
    #[repr(transparent)]
    struct Mmfsr: u8 {
        const IACCVIOL = 1 << 0;
        const DACCVIOL = 1 << 1;
        const MUNSTKERR = 1 << 3;
        const MSTKERR = 1 << 4;
        const MLSPERR = 1 << 5;
        const MMARVALID = 1 << 7;
    }
}

/// True if `exc_return`'s bit 3 (the "returned to Thread mode" bit) is set,
/// i.e. the fault happened while some task, not the kernel itself, was
/// running.
fn from_thread_mode(exc_return: u32) -> bool {
    exc_return & 0b1000 != 0
}

#[no_mangle]
pub unsafe extern "C" fn MemoryManagement() {
    let exc_return: u32;
    asm!("mov {0}, lr", out(reg) exc_return);

    let scb = &*SCB::PTR;
    let mmfsr = Mmfsr::from_bits_truncate(scb.cfsr.read() as u8);
    let mmfar = scb.mmfar.read();

    if from_thread_mode(exc_return) {
        let address = if mmfsr.contains(Mmfsr::MMARVALID) { mmfar } else { 0 };
        if startup::handle_fault(FaultKind::MemoryProtection { address }) {
            pend_context_switch();
        } else {
            halt();
        }
    } else {
        panic!("memory management fault in kernel mode: MMFSR={:?} MMFAR={:#010x}", mmfsr, mmfar);
    }
}

#[no_mangle]
pub unsafe extern "C" fn UsageFault() {
    if startup::handle_fault(FaultKind::Usage) {
        pend_context_switch();
    } else {
        halt();
    }
}

#[no_mangle]
pub unsafe extern "C" fn BusFault() {
    if startup::handle_fault(FaultKind::Bus) {
        pend_context_switch();
    } else {
        halt();
    }
}

#[no_mangle]
pub unsafe extern "C" fn HardFault() -> ! {
    let _ = startup::handle_fault(FaultKind::Hard);
    halt()
}

/// `Timing`: busy-wait helpers used only during board init, never on the
/// scheduling-critical path (`spec.md` §6).
pub struct CortexMTiming;

impl Timing for CortexMTiming {
    fn delay_cycles(&self, n: u32) {
        cortex_m::asm::delay(n);
    }

    fn wait_us(&self, n: u32) {
        cortex_m::asm::delay(n.saturating_mul(CLOCK_HZ / 1_000_000));
    }
}

/// Backs the `klog!` macro on this target. Grounded on the teacher's own
/// `klog-itm`/`klog-semihosting` feature split, reshaped from a
/// macro-per-transport into one free function so `arch::mod`'s `klog!`
/// definition can stay transport-agnostic: it just formats `args` and
/// hands them here, and the active feature decides where they go.
#[cfg(feature = "klog-itm")]
pub fn klog_write(args: core::fmt::Arguments<'_>) {
    unsafe {
        let stim = &mut (*cortex_m::peripheral::ITM::PTR).stim[0];
        cortex_m::iprintln!(stim, "{}", args);
    }
}

#[cfg(all(feature = "klog-semihosting", not(feature = "klog-itm")))]
pub fn klog_write(args: core::fmt::Arguments<'_>) {
    let _ = cortex_m_semihosting::hprintln!("{}", args);
}

#[cfg(not(any(feature = "klog-itm", feature = "klog-semihosting")))]
pub fn klog_write(_args: core::fmt::Arguments<'_>) {}
