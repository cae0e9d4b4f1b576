//! Event-driven real-time scheduler core
//!
//! A preemptive, priority-based scheduler for single-core microcontrollers:
//! - Fixed task table, registered once before the scheduler starts
//! - One FIFO ready queue per priority class with optional round robin
//! - Broadcast events, counting semaphores and binary mutexes sharing one
//!   32-bit event vector and one activation algorithm
//! - Absolute (cyclic) and relative (delay) timers resolved on the tick
//! - Context switching for ARM Cortex-M via PendSV

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============ Critical Section ============

#[cfg(target_arch = "arm")]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

pub mod log;
mod lang_items;

pub mod os;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use os::config;
pub use os::config::*;
pub use os::critical;
pub use os::error;
pub use os::error::{OsError, OsResult};
pub use os::event;
pub use os::event::{Event, EventId, EventVector, MutexId, SemId, Timer, WaitMode, WaitSpec};
pub use os::kernel;
pub use os::kernel::{os_init, os_send, os_start, os_wait};
pub use os::prio;
pub use os::types;
pub use os::types::*;
pub use os::task;
pub use os::task::{os_task_register, StackRegion, StartCondition, TaskDescriptor, TaskFn};
pub use os::sched;
pub use os::sched::{Scheduler, WaitOutcome};
pub use os::time;
pub use port::Port;

#[cfg(feature = "sem")]
pub use sync::sem;

#[cfg(feature = "mutex")]
pub use sync::mutex;
