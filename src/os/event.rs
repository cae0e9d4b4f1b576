//! Event model
//!
//! Every wait condition and every delivery is expressed as a 32-bit
//! [`EventVector`], partitioned once per build:
//!
//! ```text
//!  31      30      29 ............ S+M   S+M-1 ...... S   S-1 ...... 0
//! +-------+-------+-------------------+------------------+-------------+
//! | delay |  abs  | broadcast events  |     mutexes      | semaphores  |
//! +-------+-------+-------------------+------------------+-------------+
//! ```
//!
//! Applications never touch raw bit positions: [`SemId`], [`MutexId`],
//! [`EventId`] and [`Timer`] are typed handles, combined through [`Event`].

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use crate::config::{CFG_MUTEX_MAX, CFG_SEM_MAX};
use crate::error::{OsError, OsResult};
use crate::types::{OsFlags, OsTick};

const SEM_MASK: OsFlags = low_bits(CFG_SEM_MAX);
const MUTEX_MASK: OsFlags = low_bits(CFG_MUTEX_MAX) << CFG_SEM_MAX;
const BROADCAST_SHIFT: usize = CFG_SEM_MAX + CFG_MUTEX_MAX;
const TIMER_MASK: OsFlags = ABS_TIMER_BIT | DELAY_TIMER_BIT;
const BROADCAST_MASK: OsFlags = !(SEM_MASK | MUTEX_MASK | TIMER_MASK);
const ABS_TIMER_BIT: OsFlags = 1 << 30;
const DELAY_TIMER_BIT: OsFlags = 1 << 31;

/// Number of ordinary broadcast events available in this build
pub const BROADCAST_EVENT_MAX: usize = 30 - BROADCAST_SHIFT;

const fn low_bits(n: usize) -> OsFlags {
    if n == 0 {
        0
    } else {
        OsFlags::MAX >> (32 - n)
    }
}

// ============ Typed handles ============

/// Counting semaphore handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SemId(u8);

impl SemId {
    pub const fn new(n: u8) -> Option<Self> {
        if (n as usize) < CFG_SEM_MAX {
            Some(SemId(n))
        } else {
            None
        }
    }

    /// Handle for semaphore `n`; fails const evaluation when out of range.
    pub const fn at(n: u8) -> Self {
        match Self::new(n) {
            Some(id) => id,
            None => panic!("semaphore index out of range"),
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    const fn bit(self) -> OsFlags {
        1 << self.0
    }
}

/// Binary mutex handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MutexId(u8);

impl MutexId {
    pub const fn new(n: u8) -> Option<Self> {
        if (n as usize) < CFG_MUTEX_MAX {
            Some(MutexId(n))
        } else {
            None
        }
    }

    /// Handle for mutex `n`; fails const evaluation when out of range.
    pub const fn at(n: u8) -> Self {
        match Self::new(n) {
            Some(id) => id,
            None => panic!("mutex index out of range"),
        }
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    const fn bit(self) -> OsFlags {
        1 << (CFG_SEM_MAX + self.0 as usize)
    }
}

/// Ordinary broadcast event handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventId(u8);

impl EventId {
    pub const fn new(n: u8) -> Option<Self> {
        if (n as usize) < BROADCAST_EVENT_MAX {
            Some(EventId(n))
        } else {
            None
        }
    }

    /// Handle for broadcast event `n`; fails const evaluation when out of range.
    pub const fn at(n: u8) -> Self {
        match Self::new(n) {
            Some(id) => id,
            None => panic!("broadcast event index out of range"),
        }
    }

    #[inline(always)]
    const fn bit(self) -> OsFlags {
        1 << (BROADCAST_SHIFT + self.0 as usize)
    }
}

/// The two kernel-generated timer events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timer {
    /// Fires when the task's absolute due time is reached (cyclic tasks)
    Absolute,
    /// Fires after a relative number of ticks
    Delay,
}

impl Timer {
    #[inline(always)]
    const fn bit(self) -> OsFlags {
        match self {
            Timer::Absolute => ABS_TIMER_BIT,
            Timer::Delay => DELAY_TIMER_BIT,
        }
    }
}

/// One event of any kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Semaphore(SemId),
    Mutex(MutexId),
    Broadcast(EventId),
    Timer(Timer),
}

impl Event {
    #[inline]
    const fn bit(self) -> OsFlags {
        match self {
            Event::Semaphore(id) => id.bit(),
            Event::Mutex(id) => id.bit(),
            Event::Broadcast(id) => id.bit(),
            Event::Timer(t) => t.bit(),
        }
    }
}

// ============ Event vector ============

/// Set of events, as waited for, posted or delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct EventVector(OsFlags);

impl EventVector {
    pub const EMPTY: EventVector = EventVector(0);
    pub const ABS_TIMER: EventVector = EventVector(ABS_TIMER_BIT);
    pub const DELAY_TIMER: EventVector = EventVector(DELAY_TIMER_BIT);

    /// Reinterpret a raw 32-bit field using this build's bit layout
    #[inline(always)]
    pub const fn from_bits(bits: OsFlags) -> Self {
        EventVector(bits)
    }

    #[inline(always)]
    pub const fn bits(self) -> OsFlags {
        self.0
    }

    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Add one event (usable in `const` items)
    #[inline(always)]
    pub const fn with(self, event: Event) -> Self {
        EventVector(self.0 | event.bit())
    }

    #[inline(always)]
    pub const fn contains(self, event: Event) -> bool {
        self.0 & event.bit() != 0
    }

    #[inline(always)]
    pub const fn intersects(self, other: EventVector) -> bool {
        self.0 & other.0 != 0
    }

    #[inline(always)]
    pub const fn semaphores(self) -> Self {
        EventVector(self.0 & SEM_MASK)
    }

    #[inline(always)]
    pub const fn mutexes(self) -> Self {
        EventVector(self.0 & MUTEX_MASK)
    }

    #[inline(always)]
    pub const fn broadcasts(self) -> Self {
        EventVector(self.0 & BROADCAST_MASK)
    }

    #[inline(always)]
    pub const fn timers(self) -> Self {
        EventVector(self.0 & TIMER_MASK)
    }

    #[inline(always)]
    pub const fn without_timers(self) -> Self {
        EventVector(self.0 & !TIMER_MASK)
    }

    /// Semaphore or mutex bits
    #[inline(always)]
    pub const fn sync_objects(self) -> Self {
        EventVector(self.0 & (SEM_MASK | MUTEX_MASK))
    }

    /// Semaphores named in this vector, lowest index first
    pub fn sem_ids(self) -> impl Iterator<Item = SemId> {
        let bits = self.0;
        (0..CFG_SEM_MAX as u8)
            .map(SemId)
            .filter(move |id| bits & id.bit() != 0)
    }
}

impl From<Event> for EventVector {
    #[inline]
    fn from(event: Event) -> Self {
        EventVector(event.bit())
    }
}

impl From<SemId> for EventVector {
    #[inline]
    fn from(id: SemId) -> Self {
        EventVector(id.bit())
    }
}

impl From<MutexId> for EventVector {
    #[inline]
    fn from(id: MutexId) -> Self {
        EventVector(id.bit())
    }
}

impl From<EventId> for EventVector {
    #[inline]
    fn from(id: EventId) -> Self {
        EventVector(id.bit())
    }
}

impl From<Timer> for EventVector {
    #[inline]
    fn from(t: Timer) -> Self {
        EventVector(t.bit())
    }
}

impl<T: Into<EventVector>> BitOr<T> for EventVector {
    type Output = EventVector;

    #[inline]
    fn bitor(self, rhs: T) -> EventVector {
        EventVector(self.0 | rhs.into().0)
    }
}

impl<T: Into<EventVector>> BitOrAssign<T> for EventVector {
    #[inline]
    fn bitor_assign(&mut self, rhs: T) {
        self.0 |= rhs.into().0;
    }
}

impl BitAnd for EventVector {
    type Output = EventVector;

    #[inline]
    fn bitand(self, rhs: EventVector) -> EventVector {
        EventVector(self.0 & rhs.0)
    }
}

impl BitAndAssign for EventVector {
    #[inline]
    fn bitand_assign(&mut self, rhs: EventVector) {
        self.0 &= rhs.0;
    }
}

impl Not for EventVector {
    type Output = EventVector;

    #[inline]
    fn not(self) -> EventVector {
        EventVector(!self.0)
    }
}

// ============ Wait conditions ============

/// How the events of a wait mask combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    /// Resume on the first delivered event
    Any,
    /// Resume once every non-timer event has been delivered, or a requested
    /// timer has elapsed
    All,
}

/// Resume condition of a waiting task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WaitSpec {
    pub events: EventVector,
    pub mode: WaitMode,
    /// Ticks for the requested timer; ignored when no timer is requested
    pub timeout: OsTick,
}

impl WaitSpec {
    pub const fn any(events: EventVector) -> Self {
        WaitSpec { events, mode: WaitMode::Any, timeout: 0 }
    }

    pub const fn all(events: EventVector) -> Self {
        WaitSpec { events, mode: WaitMode::All, timeout: 0 }
    }

    /// Pure relative delay of `ticks`
    pub const fn delay(ticks: OsTick) -> Self {
        WaitSpec { events: EventVector::DELAY_TIMER, mode: WaitMode::Any, timeout: ticks }
    }

    /// Next activation of a cyclic task, `period` ticks after the last one
    pub const fn cycle(period: OsTick) -> Self {
        WaitSpec { events: EventVector::ABS_TIMER, mode: WaitMode::Any, timeout: period }
    }

    pub const fn with_timeout(mut self, timeout: OsTick) -> Self {
        self.timeout = timeout;
        self
    }

    /// Timer requested by this condition, if any
    pub fn timer(&self) -> Option<Timer> {
        if self.events.contains(Event::Timer(Timer::Absolute)) {
            Some(Timer::Absolute)
        } else if self.events.contains(Event::Timer(Timer::Delay)) {
            Some(Timer::Delay)
        } else {
            None
        }
    }

    /// Check the caller protocol of a wait condition
    pub fn validate(&self) -> OsResult<()> {
        let ev = self.events;
        if ev.is_empty() {
            return Err(OsError::WaitEmptyMask);
        }
        if ev.timers() == EventVector::ABS_TIMER | EventVector::DELAY_TIMER {
            return Err(OsError::WaitTimerConflict);
        }
        if self.mode == WaitMode::All {
            if ev.without_timers().is_empty() {
                return Err(OsError::WaitAllTimerOnly);
            }
            if !ev.timers().is_empty()
                && !ev.semaphores().is_empty()
                && !ev.mutexes().is_empty()
            {
                return Err(OsError::WaitAmbiguous);
            }
        }
        Ok(())
    }

    /// Whether `posted` satisfies this condition
    pub fn is_met(&self, posted: EventVector) -> bool {
        match self.mode {
            WaitMode::Any => !posted.is_empty(),
            WaitMode::All => self.all_arrived(posted) || self.timed_out(posted),
        }
    }

    /// Whether resources acquired without blocking already satisfy the
    /// condition. Timers cannot have elapsed yet, so ALL only looks at the
    /// non-timer events.
    pub(crate) fn is_met_without_blocking(&self, acquired: EventVector) -> bool {
        match self.mode {
            WaitMode::Any => !acquired.is_empty(),
            WaitMode::All => self.all_arrived(acquired),
        }
    }

    #[inline]
    fn all_arrived(&self, posted: EventVector) -> bool {
        posted.without_timers() == self.events.without_timers()
    }

    /// Timeout escape: an elapsed, requested timer ends an ALL wait even if
    /// other events are still missing.
    #[inline]
    fn timed_out(&self, posted: EventVector) -> bool {
        posted.intersects(self.events.timers())
    }
}
