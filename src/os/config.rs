//! Compile-time configuration
//!
//! These constants fix the resource limits and the event bit layout of a
//! build. Everything is sized statically; the scheduler never allocates.

/// Number of priority classes (valid task priorities are `0..CFG_PRIO_MAX`,
/// higher is more urgent)
pub const CFG_PRIO_MAX: usize = 16;

/// Maximum number of application tasks
pub const CFG_TASK_MAX: usize = 16;

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Core clock feeding SysTick
pub const CFG_CPU_CLOCK_HZ: u32 = 16_000_000;

/// Minimum task stack size in words
pub const CFG_STK_SIZE_MIN: usize = 64;

/// Stack size of the idle context in words
pub const CFG_IDLE_STK_SIZE: usize = 128;

/// Enable round-robin scheduling for same-priority tasks
pub const CFG_SCHED_ROUND_ROBIN_EN: bool = true;

/// Number of semaphore events, occupying event bits `0..CFG_SEM_MAX`
#[cfg(feature = "sem")]
pub const CFG_SEM_MAX: usize = 4;
#[cfg(not(feature = "sem"))]
pub const CFG_SEM_MAX: usize = 0;

/// Number of mutex events, following the semaphore bits
#[cfg(feature = "mutex")]
pub const CFG_MUTEX_MAX: usize = 4;
#[cfg(not(feature = "mutex"))]
pub const CFG_MUTEX_MAX: usize = 0;

/// Whether any synchronization object is compiled in
pub const CFG_SYNC_EN: bool = CFG_SEM_MAX + CFG_MUTEX_MAX > 0;

const _: () = assert!(CFG_SEM_MAX + CFG_MUTEX_MAX <= 30, "sync objects exceed the event vector");
const _: () = assert!(CFG_TASK_MAX < u8::MAX as usize, "task ids are stored as u8");
const _: () = assert!(CFG_PRIO_MAX <= 256, "priorities are stored as u8");
const _: () = assert!(CFG_IDLE_STK_SIZE >= CFG_STK_SIZE_MIN);
