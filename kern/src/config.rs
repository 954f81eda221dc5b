//! Compile-time sizing for every fixed table the kernel owns. Nothing in
//! this kernel allocates a collection at runtime; every bound a task,
//! mutex, semaphore, or heap block can hit is a `const` reviewable here.

/// Number of task control block slots.
pub const MAX_TASKS: usize = 16;

/// Number of priority levels; 0 is highest.
pub const NUM_PRIORITIES: usize = 16;

/// Number of mutex slots.
pub const MAX_MUTEXES: usize = 8;

/// Number of counting semaphore slots.
pub const MAX_SEMAPHORES: usize = 8;

/// Waiters a single mutex can queue before `LOCK` reports
/// `ResourceExhausted`.
pub const MAX_MUTEX_QUEUE: usize = MAX_TASKS;

/// Waiters a single semaphore can queue before `WAIT` reports
/// `ResourceExhausted`.
pub const MAX_SEMAPHORE_QUEUE: usize = MAX_TASKS;

/// Heap allocation records outstanding at once (one per live `MALLOC`).
pub const MAX_HEAP_BLOCKS: usize = MAX_TASKS * 2;

/// System-timer tick period, in milliseconds.
pub const TICK_PERIOD_MS: u32 = 1;

/// Ticks between ping-pong CPU-time buffer swaps.
pub const CPU_TIME_SWAP_PERIOD: u32 = 1024;

static_assertions::const_assert!(MAX_TASKS <= abi::MAX_PS_ENTRIES);
static_assertions::const_assert!(NUM_PRIORITIES <= 256);
static_assertions::const_assert!(TICK_PERIOD_MS == abi::TICK_PERIOD_MS);
