//! Priority bitmap management for O(1) highest-ready lookup
//!
//! One bit per priority class; a set bit means the class's ready queue is
//! non-empty. Classes are numbered so that a larger number is more urgent,
//! which makes the most significant set bit the winner and lets the lookup
//! use the CLZ instruction directly.

use crate::config::CFG_PRIO_MAX;
use crate::types::OsPrio;

/// Number of words needed for the priority bitmap
const PRIO_TBL_SIZE: usize = (CFG_PRIO_MAX + 31) / 32;

/// Priority bitmap table
///
/// Priority `p` lives in word `p / 32`, bit `p % 32`. The scan walks the
/// words from the top so the highest class is found first.
#[derive(Clone, Copy)]
pub struct PrioTable {
    bitmap: [u32; PRIO_TBL_SIZE],
}

impl PrioTable {
    pub const fn new() -> Self {
        PrioTable {
            bitmap: [0; PRIO_TBL_SIZE],
        }
    }

    /// Mark a priority class as having ready tasks
    #[inline]
    pub fn insert(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        self.bitmap[Self::word(prio)] |= Self::mask(prio);
    }

    /// Mark a priority class as empty
    #[inline]
    pub fn remove(&mut self, prio: OsPrio) {
        debug_assert!((prio as usize) < CFG_PRIO_MAX);
        self.bitmap[Self::word(prio)] &= !Self::mask(prio);
    }

    /// Highest priority class with ready tasks, `None` when only the idle
    /// context can run
    #[inline]
    pub fn get_highest(&self) -> Option<OsPrio> {
        for (idx, &word) in self.bitmap.iter().enumerate().rev() {
            if word != 0 {
                let bit = 31 - word.leading_zeros() as usize;
                return Some((idx * 32 + bit) as OsPrio);
            }
        }
        None
    }

    /// Check if a specific priority has any ready tasks
    #[inline]
    pub fn is_set(&self, prio: OsPrio) -> bool {
        (self.bitmap[Self::word(prio)] & Self::mask(prio)) != 0
    }

    /// Check if the priority table is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bitmap.iter().all(|&w| w == 0)
    }

    #[inline(always)]
    fn word(prio: OsPrio) -> usize {
        prio as usize / 32
    }

    #[inline(always)]
    fn mask(prio: OsPrio) -> u32 {
        1 << (prio % 32)
    }
}

impl Default for PrioTable {
    fn default() -> Self {
        Self::new()
    }
}
