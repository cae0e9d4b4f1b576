//! Port layer - CPU-specific implementations
//!
//! The scheduler never touches registers or stacks itself. It decides which
//! task runs and hands that decision to a [`Port`], which owns the saved
//! contexts and performs the actual transfer.

use crate::event::EventVector;
use crate::task::{StackRegion, TaskFn};
use crate::types::TaskId;

/// Context switch gate
pub trait Port {
    /// (Re)create the initial context of `task`
    ///
    /// Called at registration and whenever a task restarts. The next switch
    /// to `task` enters `entry` from the top of `stack`.
    fn init_context(&mut self, task: TaskId, entry: TaskFn, stack: StackRegion);

    /// Transfer the CPU to `task`
    ///
    /// `payload` is `Some` when the task resumes from a wait (or starts for
    /// the first time) and carries the events delivered to it; a fresh
    /// context receives it as its entry argument. A task that was preempted
    /// resumes with `None`.
    fn switch_to(&mut self, task: TaskId, payload: Option<EventVector>);
}

#[cfg(target_arch = "arm")]
pub mod cortex_m4;

#[cfg(target_arch = "arm")]
pub use cortex_m4::{os_cpu_systick_init, os_start_high_rdy, PendSvPort as TargetPort};

// Stub implementations for non-ARM targets (for testing)
#[cfg(not(target_arch = "arm"))]
pub mod stub {
    use super::Port;
    use crate::event::EventVector;
    use crate::task::{StackRegion, TaskFn};
    use crate::types::TaskId;

    /// Port that only records the scheduler's decisions
    #[derive(Debug, Default)]
    pub struct StubPort {
        current: Option<TaskId>,
    }

    impl StubPort {
        pub const fn new() -> Self {
            StubPort { current: None }
        }

        /// Task of the last switch
        pub fn current(&self) -> Option<TaskId> {
            self.current
        }
    }

    impl Port for StubPort {
        fn init_context(&mut self, _task: TaskId, _entry: TaskFn, _stack: StackRegion) {}

        fn switch_to(&mut self, task: TaskId, _payload: Option<EventVector>) {
            self.current = Some(task);
        }
    }

    /// Nothing to launch on the host; the first switch is already recorded.
    pub unsafe fn os_start_high_rdy() {}

    pub fn os_cpu_systick_init(_cnts: u32) {
        // No-op for testing
    }
}

#[cfg(not(target_arch = "arm"))]
pub use stub::{os_cpu_systick_init, os_start_high_rdy, StubPort as TargetPort};
