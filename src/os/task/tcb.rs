//! Task Control Block (TCB) definition
//!
//! The TCB holds everything the scheduler knows about one task: its static
//! registration data, its place in the ready/suspended lists and its
//! wait state.

use crate::event::{EventVector, WaitSpec};
use crate::task::{StackRegion, StartCondition, TaskFn};
use crate::types::{OsOverrunCtr, OsPrio, OsTick, TaskId};

/// Links of the one list (ready queue or suspended list) holding a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub next: Option<TaskId>,
    pub prev: Option<TaskId>,
}

impl Link {
    pub const UNLINKED: Link = Link { next: None, prev: None };
}

/// Task Control Block
#[derive(Clone, Copy)]
pub struct Tcb {
    // ============ Registration ============
    /// Task name for diagnostics
    pub name: &'static str,
    /// Task entry point
    pub entry: Option<TaskFn>,
    /// Priority class
    pub prio: OsPrio,
    /// Stack region
    pub stack: StackRegion,
    /// Condition the task starts (and restarts) with
    pub start: StartCondition,

    // ============ List links ============
    pub link: Link,
    /// Whether the task sits in the suspended list (else in a ready queue)
    pub suspended: bool,

    // ============ Wait state ============
    /// Resume condition while suspended
    pub wait: WaitSpec,
    /// Events delivered since the task suspended
    pub posted: EventVector,
    /// Value handed back when the task next resumes from `wait`
    pub delivered: EventVector,
    /// Task is parked inside `wait` (or not started yet) and expects a
    /// payload when it is switched to
    pub resumes_from_wait: bool,

    // ============ Timers ============
    /// Absolute due time of the last cyclic activation
    pub due: OsTick,
    /// Remaining ticks of a delay timer (0 = not running)
    pub delay: OsTick,
    /// Number of cyclic activations that were already late
    pub overruns: OsOverrunCtr,

    // ============ Time slicing ============
    /// Round-robin budget (0 = no round robin)
    pub time_quanta: OsTick,
    /// Remaining round-robin budget
    pub time_quanta_ctr: OsTick,
}

impl Tcb {
    pub const EMPTY: Tcb = Tcb {
        name: "",
        entry: None,
        prio: 0,
        stack: StackRegion::EMPTY,
        start: StartCondition::Ready,

        link: Link::UNLINKED,
        suspended: false,

        wait: WaitSpec::any(EventVector::EMPTY),
        posted: EventVector::EMPTY,
        delivered: EventVector::EMPTY,
        resumes_from_wait: false,

        due: 0,
        delay: 0,
        overruns: 0,

        time_quanta: 0,
        time_quanta_ctr: 0,
    };

    /// Clear everything that changes while the task runs, keeping its
    /// registration data and its cyclic time base.
    pub fn reset_dynamic(&mut self) {
        self.link = Link::UNLINKED;
        self.suspended = false;
        self.wait = WaitSpec::any(EventVector::EMPTY);
        self.posted = EventVector::EMPTY;
        self.delivered = EventVector::EMPTY;
        self.resumes_from_wait = true;
        self.delay = 0;
        self.time_quanta_ctr = self.time_quanta;
    }

    /// Reload the round-robin budget
    #[inline]
    pub fn reload_quanta(&mut self) {
        self.time_quanta_ctr = self.time_quanta;
    }
}

impl Default for Tcb {
    fn default() -> Self {
        Self::EMPTY
    }
}
