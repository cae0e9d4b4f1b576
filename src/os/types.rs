//! Core type definitions
//!
//! These types provide strong typing for scheduler primitives.

use crate::config::CFG_TASK_MAX;

/// Task priority class (higher value = more urgent)
pub type OsPrio = u8;

/// Tick counter type
pub type OsTick = u32;

/// Semaphore counter type
pub type OsSemCtr = u16;

/// Per-task overrun counter
pub type OsOverrunCtr = u16;

/// Stack element type
pub type OsStkElement = u32;

/// Raw event bits
pub type OsFlags = u32;

/// Stable task identity
///
/// Application tasks are numbered `0..N` in registration order. The idle
/// context has the reserved id [`TaskId::IDLE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(transparent)]
pub struct TaskId(u8);

impl TaskId {
    /// The background context that runs when no task is ready
    pub const IDLE: TaskId = TaskId(CFG_TASK_MAX as u8);

    #[inline(always)]
    pub(crate) const fn from_index(idx: usize) -> Self {
        TaskId(idx as u8)
    }

    /// Slot index of this task (the idle context maps to `CFG_TASK_MAX`)
    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline(always)]
    pub const fn is_idle(self) -> bool {
        self.0 as usize == CFG_TASK_MAX
    }
}

/// Observable task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TaskState {
    /// Task owns the CPU (and is the head of its ready queue)
    Active = 0,
    /// Task is queued and eligible to run
    Ready = 1,
    /// Task waits for events, timers or sync objects
    Suspended = 2,
}

/// Signed distance from `now` to `due` on the wrapping tick counter
#[inline(always)]
pub(crate) fn tick_diff(due: OsTick, now: OsTick) -> i32 {
    due.wrapping_sub(now) as i32
}
