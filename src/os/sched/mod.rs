//! Scheduler module
//!
//! Priority-based preemptive scheduler with round-robin for same priority.
//!
//! All state lives in one [`Scheduler`] value. Its methods are the three
//! trigger points (`tick`, `send`, `wait`) plus registration and queries;
//! each one ends with the activation selector and, when the winner changed,
//! a call into the [`Port`] to transfer the CPU.

mod pend;
mod post;
mod task_list;

pub use task_list::{TaskList, TaskListIter};

use crate::config::{CFG_PRIO_MAX, CFG_SYNC_EN, CFG_TASK_MAX};
use crate::error::{OsError, OsResult};
use crate::event::EventVector;
#[cfg(feature = "mutex")]
use crate::mutex::MutexTable;
use crate::port::Port;
use crate::prio::PrioTable;
#[cfg(feature = "sem")]
use crate::sem::SemTable;
use crate::task::Tcb;
use crate::types::{OsPrio, OsTick, TaskId, TaskState};
use crate::{error, trace};

/// Result of a `wait` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitOutcome {
    /// The condition was met without blocking; carries the acquired events
    Ready(EventVector),
    /// The caller was suspended and the CPU handed to another task. The
    /// delivered events are collected with [`Scheduler::take_delivered`]
    /// once the caller runs again.
    Suspended,
}

/// Scheduler state
pub struct Scheduler<P: Port> {
    pub(crate) port: P,
    pub(crate) tcbs: [Tcb; CFG_TASK_MAX],
    pub(crate) task_count: usize,
    pub(crate) prio_tbl: PrioTable,
    pub(crate) rdy_list: [TaskList; CFG_PRIO_MAX],
    pub(crate) suspended: TaskList,
    #[cfg(feature = "sem")]
    pub(crate) sems: SemTable,
    #[cfg(feature = "mutex")]
    pub(crate) mutexes: MutexTable,
    pub(crate) active: TaskId,
    pub(crate) now: OsTick,
    pub(crate) running: bool,
    pub(crate) ctx_sw_ctr: u32,
}

impl<P: Port> Scheduler<P> {
    /// Create an empty scheduler driving `port`
    pub const fn new(port: P) -> Self {
        Scheduler {
            port,
            tcbs: [Tcb::EMPTY; CFG_TASK_MAX],
            task_count: 0,
            prio_tbl: PrioTable::new(),
            rdy_list: [TaskList::new(); CFG_PRIO_MAX],
            suspended: TaskList::new(),
            #[cfg(feature = "sem")]
            sems: SemTable::new(),
            #[cfg(feature = "mutex")]
            mutexes: MutexTable::new(),
            active: TaskId::IDLE,
            now: 0,
            running: false,
            ctx_sw_ctr: 0,
        }
    }

    /// Start scheduling
    ///
    /// Selects the first task and transfers the CPU to it. Registration is
    /// closed from here on.
    pub fn start(&mut self) -> OsResult<TaskId> {
        if self.running {
            return Err(OsError::OsRunning);
        }
        self.running = true;
        self.dispatch(true);
        Ok(self.active)
    }

    // ============ Activation selector ============

    /// Head of the highest-priority non-empty ready queue, or the idle context
    pub fn select(&self) -> TaskId {
        self.prio_tbl
            .get_highest()
            .and_then(|prio| self.rdy_list[prio as usize].head())
            .unwrap_or(TaskId::IDLE)
    }

    /// Run the selector and hand the CPU over if the winner changed
    ///
    /// The new task receives its posted events as payload when it is parked
    /// inside `wait`; a preempted task resumes without one. Returns whether
    /// a switch was commanded.
    pub(crate) fn dispatch(&mut self, force: bool) -> bool {
        let next = self.select();
        if next == self.active && !force {
            return false;
        }

        let prev = self.active;
        self.active = next;
        self.ctx_sw_ctr = self.ctx_sw_ctr.wrapping_add(1);

        let payload = if next.is_idle() {
            None
        } else {
            let tcb = &mut self.tcbs[next.index()];
            if tcb.resumes_from_wait {
                tcb.resumes_from_wait = false;
                tcb.delivered = tcb.posted;
                tcb.posted = EventVector::EMPTY;
                Some(tcb.delivered)
            } else {
                None
            }
        };

        trace!("switch {} -> {}", prev, next);
        self.port.switch_to(next, payload);
        true
    }

    // ============ Ready / suspended index ============

    /// Append a task to the tail of its ready queue
    pub(crate) fn make_ready(&mut self, id: TaskId) {
        let tcb = &mut self.tcbs[id.index()];
        tcb.suspended = false;
        let prio = tcb.prio;
        self.rdy_list[prio as usize].insert_tail(&mut self.tcbs, id);
        self.prio_tbl.insert(prio);
    }

    /// Take a task off its ready queue
    pub(crate) fn rdy_list_remove(&mut self, id: TaskId) {
        let prio = self.tcbs[id.index()].prio;
        let list = &mut self.rdy_list[prio as usize];
        list.remove(&mut self.tcbs, id);
        if list.is_empty() {
            self.prio_tbl.remove(prio);
        }
    }

    /// Move the head of a ready queue to its tail
    pub(crate) fn rotate(&mut self, prio: OsPrio) {
        let list = &mut self.rdy_list[prio as usize];
        if let Some(head) = list.head() {
            if list.has_peers() {
                list.remove(&mut self.tcbs, head);
                list.insert_tail(&mut self.tcbs, head);
            }
        }
    }

    /// Insert a task into the suspended list
    ///
    /// With sync objects compiled in the list is priority sorted so that
    /// mutexes and semaphore units go to the most urgent, longest waiting
    /// task; otherwise arrival order is all that matters.
    pub(crate) fn suspended_insert(&mut self, id: TaskId) {
        self.tcbs[id.index()].suspended = true;
        if CFG_SYNC_EN {
            self.suspended.insert_by_prio(&mut self.tcbs, id);
        } else {
            self.suspended.insert_tail(&mut self.tcbs, id);
        }
    }

    /// Activation check: make a suspended task ready if its condition holds
    pub(crate) fn try_activate(&mut self, id: TaskId) -> bool {
        let tcb = &self.tcbs[id.index()];
        if !tcb.suspended || !tcb.wait.is_met(tcb.posted) {
            return false;
        }

        self.suspended.remove(&mut self.tcbs, id);
        let tcb = &mut self.tcbs[id.index()];
        tcb.delay = 0;
        tcb.reload_quanta();
        self.make_ready(id);
        true
    }

    /// Run the activation check on every suspended task
    pub(crate) fn activate_satisfied(&mut self) {
        let mut cursor = self.suspended.head();
        while let Some(id) = cursor {
            cursor = self.tcbs[id.index()].link.next;
            self.try_activate(id);
        }
    }

    /// Validate a task id against the registry
    pub(crate) fn check_task(&self, id: TaskId) -> OsResult<()> {
        if id.index() < self.task_count {
            Ok(())
        } else {
            error!("unknown task {}", id);
            Err(OsError::TaskInvalid)
        }
    }

    // ============ Queries ============

    /// Task currently owning the CPU
    #[inline]
    pub fn active(&self) -> TaskId {
        self.active
    }

    /// Current tick count
    #[inline]
    pub fn now(&self) -> OsTick {
        self.now
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of registered tasks
    #[inline]
    pub fn task_count(&self) -> usize {
        self.task_count
    }

    /// Number of context switches commanded so far
    #[inline]
    pub fn context_switches(&self) -> u32 {
        self.ctx_sw_ctr
    }

    /// Where a task currently is
    pub fn task_state(&self, id: TaskId) -> OsResult<TaskState> {
        if id == self.active {
            return Ok(TaskState::Active);
        }
        if id.is_idle() {
            return Ok(TaskState::Ready);
        }
        self.check_task(id)?;
        Ok(if self.tcbs[id.index()].suspended {
            TaskState::Suspended
        } else {
            TaskState::Ready
        })
    }

    /// Tasks queued at `prio`, head first
    pub fn ready_tasks(&self, prio: OsPrio) -> TaskListIter<'_> {
        match self.rdy_list.get(prio as usize) {
            Some(list) => list.iter(&self.tcbs),
            None => TaskList::new().iter(&self.tcbs),
        }
    }

    /// Suspended tasks in dispatch order
    pub fn suspended_tasks(&self) -> TaskListIter<'_> {
        self.suspended.iter(&self.tcbs)
    }

    /// Events delivered to a task when it last resumed
    ///
    /// A task calls this right after `wait` returned
    /// [`WaitOutcome::Suspended`] and it has been switched back in.
    pub fn take_delivered(&mut self, id: TaskId) -> EventVector {
        match self.tcbs.get_mut(id.index()) {
            Some(tcb) => core::mem::take(&mut tcb.delivered),
            None => EventVector::EMPTY,
        }
    }

    /// Access the port
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Mutable access to the port
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }
}
