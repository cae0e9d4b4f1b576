//! Semaphore counters
//!
//! Counting semaphores occupy the lowest event bits. A posted unit that no
//! waiter takes is parked in a counter here; a later `wait` on that bit
//! takes it back without blocking.

use crate::config::CFG_SEM_MAX;
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::event::SemId;
use crate::kernel::{self, SCHED};
use crate::port::Port;
use crate::sched::Scheduler;
use crate::types::OsSemCtr;

/// Counters of all semaphores
#[derive(Debug, Clone, Copy)]
pub struct SemTable {
    count: [OsSemCtr; CFG_SEM_MAX],
}

impl SemTable {
    pub const fn new() -> Self {
        SemTable {
            count: [0; CFG_SEM_MAX],
        }
    }

    /// Take one unit if available
    #[inline]
    pub fn try_acquire(&mut self, id: SemId) -> bool {
        let ctr = &mut self.count[id.index()];
        if *ctr > 0 {
            *ctr -= 1;
            true
        } else {
            false
        }
    }

    /// Return one unit; the counter sticks at its maximum
    #[inline]
    pub fn release(&mut self, id: SemId) {
        let ctr = &mut self.count[id.index()];
        *ctr = ctr.saturating_add(1);
    }

    #[inline]
    pub fn count(&self, id: SemId) -> OsSemCtr {
        self.count[id.index()]
    }

    #[inline]
    pub fn set(&mut self, id: SemId, count: OsSemCtr) {
        self.count[id.index()] = count;
    }
}

impl Default for SemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Port> Scheduler<P> {
    /// Preset a semaphore counter
    ///
    /// # Returns
    /// * `Err(OsError::OsRunning)` - Counters are only preset before start
    pub fn sem_init(&mut self, id: SemId, count: OsSemCtr) -> OsResult<()> {
        if self.running {
            return Err(OsError::OsRunning);
        }
        self.sems.set(id, count);
        Ok(())
    }

    /// Units currently parked in a semaphore
    #[inline]
    pub fn sem_count(&self, id: SemId) -> OsSemCtr {
        self.sems.count(id)
    }
}

/// Preset a semaphore counter of the kernel instance before `os_start`
pub fn os_sem_init(id: SemId, count: OsSemCtr) -> OsResult<()> {
    if !kernel::KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }
    critical_section(|cs| SCHED.get(cs).sem_init(id, count))
}

/// Units currently parked in a semaphore of the kernel instance
pub fn os_sem_count(id: SemId) -> OsSemCtr {
    critical_section(|cs| SCHED.get(cs).sem_count(id))
}
