//! Suspend handler - `wait`

use crate::error::{OsError, OsResult};
use crate::event::{EventVector, Timer, WaitSpec};
use crate::port::Port;
use crate::sched::{Scheduler, WaitOutcome};
use crate::types::{tick_diff, TaskId};
use crate::{error, warn};

impl<P: Port> Scheduler<P> {
    /// Suspend the active task until `spec` is met
    ///
    /// Free semaphores and mutexes named in the mask are taken right away.
    /// If that already satisfies the condition the call returns
    /// [`WaitOutcome::Ready`] and nothing is rescheduled. Otherwise the
    /// caller leaves its ready queue, keeps whatever it acquired as posted
    /// events and the CPU goes to the next task.
    ///
    /// # Returns
    /// * `Err(OsError::OsNotRunning)` - Scheduler not started
    /// * `Err(OsError::WaitIdle)` - Called from the idle context
    /// * `Err(..)` - Mask rejected by [`WaitSpec::validate`]
    pub fn wait(&mut self, spec: WaitSpec) -> OsResult<WaitOutcome> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }

        let caller = self.active;
        if caller.is_idle() {
            error!("idle context tried to wait");
            return Err(OsError::WaitIdle);
        }

        if let Err(e) = spec.validate() {
            error!("task {} wait rejected: {}", caller, e);
            return Err(e);
        }

        let acquired = self.acquire_free(spec.events);
        if spec.is_met_without_blocking(acquired) {
            return Ok(WaitOutcome::Ready(acquired));
        }

        self.rdy_list_remove(caller);
        self.tcbs[caller.index()].posted = acquired;
        self.tcbs[caller.index()].resumes_from_wait = true;
        self.suspend(caller, spec);

        self.dispatch(false);
        Ok(WaitOutcome::Suspended)
    }

    /// Take every requested semaphore unit and mutex that is free now
    #[allow(unused_mut, unused_variables)]
    fn acquire_free(&mut self, events: EventVector) -> EventVector {
        let mut acquired = EventVector::EMPTY;

        #[cfg(feature = "sem")]
        for id in events.sem_ids() {
            if self.sems.try_acquire(id) {
                acquired |= id;
            }
        }

        #[cfg(feature = "mutex")]
        {
            acquired |= self.mutexes.acquire_free(events.mutexes());
        }
        acquired
    }

    /// Store the resume condition and park a task in the suspended list
    ///
    /// The task must not be on any list. An absolute timer advances the
    /// task's due time by the timeout; a due time that is already reached
    /// counts as an overrun and is moved to the next tick. A delay timer
    /// runs one tick longer than requested because the call is not aligned
    /// with the tick.
    pub(crate) fn suspend(&mut self, id: TaskId, spec: WaitSpec) {
        let now = self.now;
        let tcb = &mut self.tcbs[id.index()];

        match spec.timer() {
            Some(Timer::Absolute) => {
                let due = tcb.due.wrapping_add(spec.timeout);
                if tick_diff(due, now) <= 0 {
                    tcb.overruns = tcb.overruns.saturating_add(1);
                    tcb.due = now.wrapping_add(1);
                    warn!("task {} overrun, due {} at {}", id, due, now);
                } else {
                    tcb.due = due;
                }
            }
            Some(Timer::Delay) => {
                tcb.delay = spec.timeout.saturating_add(1);
            }
            None => {}
        }

        tcb.wait = spec;
        self.suspended_insert(id);
    }
}
