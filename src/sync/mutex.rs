//! Mutex free set
//!
//! Mutexes follow the semaphore bits in the event vector. A mutex is
//! either free (its bit is set here) or held by the task that has the bit
//! in its posted or delivered events. There is no owner record and no
//! priority inheritance; the holder releases it by sending the bit.

use crate::critical::critical_section;
use crate::event::{EventVector, MutexId};
use crate::kernel::SCHED;
use crate::port::Port;
use crate::sched::Scheduler;

/// Free/held state of all mutexes
#[derive(Debug, Clone, Copy)]
pub struct MutexTable {
    free: EventVector,
}

impl MutexTable {
    /// All mutexes start free
    pub const fn new() -> Self {
        MutexTable {
            free: EventVector::from_bits(u32::MAX).mutexes(),
        }
    }

    /// Take the requested mutexes that are free, returning the ones taken
    #[inline]
    pub fn acquire_free(&mut self, requested: EventVector) -> EventVector {
        let taken = requested.mutexes() & self.free;
        self.free &= !taken;
        taken
    }

    /// Whether every mutex in `bits` is currently held
    #[inline]
    pub fn all_held(&self, bits: EventVector) -> bool {
        !bits.mutexes().intersects(self.free)
    }

    /// Return mutexes to the free set
    #[inline]
    pub fn release(&mut self, bits: EventVector) {
        self.free |= bits.mutexes();
    }

    #[inline]
    pub fn is_free(&self, id: MutexId) -> bool {
        self.free.intersects(id.into())
    }
}

impl Default for MutexTable {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Port> Scheduler<P> {
    /// Whether a mutex is free
    #[inline]
    pub fn mutex_is_free(&self, id: MutexId) -> bool {
        self.mutexes.is_free(id)
    }
}

/// Whether a mutex of the kernel instance is free
pub fn os_mutex_is_free(id: MutexId) -> bool {
    critical_section(|cs| SCHED.get(cs).mutex_is_free(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_only_free() {
        let mut table = MutexTable::new();
        let m0 = MutexId::at(0);
        let m1 = MutexId::at(1);

        let taken = table.acquire_free(EventVector::from(m0));
        assert_eq!(taken, EventVector::from(m0));
        assert!(!table.is_free(m0));

        let taken = table.acquire_free(EventVector::from(m0) | m1);
        assert_eq!(taken, EventVector::from(m1));
        assert!(table.all_held(EventVector::from(m0) | m1));
    }

    #[test]
    fn test_release() {
        let mut table = MutexTable::new();
        let m = MutexId::at(2);
        assert!(!table.all_held(m.into()));
        table.acquire_free(m.into());
        table.release(m.into());
        assert!(table.is_free(m));
    }
}
