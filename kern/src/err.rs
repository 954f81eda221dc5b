//! Internal error taxonomy for kernel primitives.
//!
//! Nothing here crosses the supervisor-call boundary directly -- the
//! dispatcher (`syscalls`) collapses a `KernelError` into the sentinel
//! return value a task actually sees. Keeping a real enum internally lets
//! the rest of the kernel use `?` instead of threading sentinels by hand,
//! mirroring the split the teacher crate draws between `UserError` and
//! the raw register-level ABI.

/// Recoverable failures a supervisor call can report. Corresponds to the
/// taxonomy in the design's error-handling section.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KernelError {
    /// Task table, mutex/semaphore table, a waiter queue, or the heap has
    /// no room left.
    ResourceExhausted,
    /// A pid, mutex index, semaphore index, or name did not resolve to a
    /// live object.
    InvalidArgument,
    /// `UNLOCK` issued by a task that is not the mutex's owner. Per the
    /// documented contract this is silently ignored by the caller of
    /// this error -- it exists so internal code can still distinguish
    /// the case from genuine bugs in assertions and tests.
    PermissionViolation,
}

/// A fault observed while a task was running: either it touched memory
/// outside its window, or it executed an instruction the CPU itself
/// rejects (divide by zero, unaligned access under `UNALIGN_TRP`, a bus
/// error reported by the memory system). These never turn into a
/// supervisor-call return value; they route to `fault::handle_*`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum FaultKind {
    /// MPU denied access. Recoverable: the task's timeslice ends, it
    /// remains a candidate to be killed or to keep running if nothing
    /// kills it.
    MemoryProtection { address: u32 },
    /// Usage fault or bus fault. The task is considered dead; the kernel
    /// halts rather than guessing at a correct continuation.
    Usage,
    Bus,
    /// Hard fault -- unrecoverable by definition.
    Hard,
}
