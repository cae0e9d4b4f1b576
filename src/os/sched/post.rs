//! Event dispatcher - `send`

use crate::error::{OsError, OsResult};
use crate::event::EventVector;
use crate::port::Port;
use crate::sched::Scheduler;
use crate::error;

impl<P: Port> Scheduler<P> {
    /// Post events on behalf of the active task
    ///
    /// Broadcast events go to every waiting task that asks for them. Each
    /// released mutex and each semaphore unit goes to exactly one waiter:
    /// the first eligible one in the suspended list, which is ordered by
    /// priority and then by arrival. Whatever no waiter takes is returned
    /// to the semaphore counters and the mutex free set.
    ///
    /// # Returns
    /// * `Err(OsError::SendTimerEvent)` - Timer events are kernel-generated
    /// * `Err(OsError::MutexNotHeld)` - A released mutex was already free
    pub fn send(&mut self, events: EventVector) -> OsResult<()> {
        if !events.timers().is_empty() {
            error!("task {} sent a timer event", self.active);
            return Err(OsError::SendTimerEvent);
        }

        #[cfg(feature = "mutex")]
        if !self.mutexes.all_held(events.mutexes()) {
            error!("task {} released a free mutex", self.active);
            return Err(OsError::MutexNotHeld);
        }

        let broadcasts = events.broadcasts();
        let mut mutex_pool = events.mutexes();
        let mut sem_pool = events.semaphores();

        // Broadcasts and mutexes first; a mutex leaves the pool with the
        // first task that takes it.
        let mut cursor = self.suspended.head();
        while let Some(id) = cursor {
            let tcb = &mut self.tcbs[id.index()];
            cursor = tcb.link.next;

            let got = (broadcasts | mutex_pool) & tcb.wait.events;
            tcb.posted |= got;
            mutex_pool &= !got.mutexes();
        }

        // One unit per semaphore bit, to a waiter not already holding one.
        let mut cursor = self.suspended.head();
        while let Some(id) = cursor {
            if sem_pool.is_empty() {
                break;
            }
            let tcb = &mut self.tcbs[id.index()];
            cursor = tcb.link.next;

            let got = sem_pool & tcb.wait.events & !tcb.posted;
            tcb.posted |= got;
            sem_pool &= !got;
        }

        #[cfg(feature = "sem")]
        for id in sem_pool.sem_ids() {
            self.sems.release(id);
        }
        #[cfg(feature = "mutex")]
        self.mutexes.release(mutex_pool);

        self.activate_satisfied();
        if self.running {
            self.dispatch(false);
        }
        Ok(())
    }
}
