//! Time management module
//!
//! Provides tick handling, time delays and cyclic activation.

use crate::config::{CFG_SCHED_ROUND_ROBIN_EN, CFG_TICK_RATE_HZ};
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::event::{Event, EventVector, Timer, WaitSpec};
use crate::kernel::{self, SCHED};
use crate::port::Port;
use crate::sched::Scheduler;
use crate::types::OsTick;

impl<P: Port> Scheduler<P> {
    /// Advance time by one tick
    ///
    /// Resolves the timers of all suspended tasks, applies round robin to
    /// the task that was running and reselects. A task preempted here
    /// resumes exactly where it was interrupted.
    ///
    /// # Returns
    /// `true` when a different task must run.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        self.now = self.now.wrapping_add(1);
        let now = self.now;

        let mut cursor = self.suspended.head();
        while let Some(id) = cursor {
            let tcb = &mut self.tcbs[id.index()];
            cursor = tcb.link.next;

            let mut elapsed = EventVector::EMPTY;
            if tcb.wait.events.contains(Event::Timer(Timer::Absolute)) && tcb.due == now {
                elapsed |= Timer::Absolute;
            }
            if tcb.delay != 0 {
                tcb.delay -= 1;
                if tcb.delay == 0 {
                    elapsed |= Timer::Delay;
                }
            }

            let elapsed = elapsed & tcb.wait.events;
            if !elapsed.is_empty() {
                tcb.posted |= elapsed;
                self.try_activate(id);
            }
        }

        if CFG_SCHED_ROUND_ROBIN_EN {
            self.round_robin();
        }

        self.dispatch(false)
    }

    /// Time slicing for the running task
    fn round_robin(&mut self) {
        let cur = self.active;
        if cur.is_idle() {
            return;
        }

        let tcb = &mut self.tcbs[cur.index()];
        if tcb.time_quanta == 0 || tcb.suspended {
            return;
        }

        tcb.time_quanta_ctr = tcb.time_quanta_ctr.saturating_sub(1);
        if tcb.time_quanta_ctr == 0 {
            tcb.reload_quanta();
            let prio = tcb.prio;
            if self.rdy_list[prio as usize].head() == Some(cur) {
                self.rotate(prio);
            }
        }
    }
}

/// Tick handler
///
/// Called once per system tick by the timer interrupt.
pub fn os_tick_handler() {
    if !kernel::KERNEL.is_running() {
        return;
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        sched.tick();
        kernel::KERNEL.set_tick(sched.now());
    });
}

/// Suspend the calling task for at least `ticks` ticks
///
/// The task resumes no earlier than `ticks` and at most one tick later.
pub fn os_time_dly(ticks: OsTick) -> OsResult<()> {
    kernel::os_wait_spec(WaitSpec::delay(ticks)).map(|_| ())
}

/// Time delay in hours, minutes, seconds, milliseconds
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
pub fn os_time_dly_hmsm(
    hours: u16,
    minutes: u8,
    seconds: u8,
    milliseconds: u16,
) -> OsResult<()> {
    os_time_dly(hmsm_to_ticks(hours, minutes, seconds, milliseconds)?)
}

/// Convert a wall-clock duration into ticks, rounding to the nearest tick
pub fn hmsm_to_ticks(hours: u16, minutes: u8, seconds: u8, milliseconds: u16) -> OsResult<OsTick> {
    if hours > 999 || minutes > 59 || seconds > 59 || milliseconds > 999 {
        return Err(OsError::TimeInvalid);
    }

    let total_ms = (hours as u64) * 3_600_000
        + (minutes as u64) * 60_000
        + (seconds as u64) * 1000
        + (milliseconds as u64);

    let ticks = (total_ms * CFG_TICK_RATE_HZ as u64 + 500) / 1000;
    OsTick::try_from(ticks).map_err(|_| OsError::TimeInvalid)
}

/// Wait for the next activation of a cyclic task
///
/// The due time advances by `period` from the previous due time, not from
/// now, so the cycle does not drift. Returns the delivered events.
pub fn os_time_dly_cycle(period: OsTick) -> OsResult<EventVector> {
    kernel::os_wait_spec(WaitSpec::cycle(period))
}

/// Get current tick count
#[inline]
pub fn os_time_get() -> OsTick {
    kernel::KERNEL.tick_get()
}

/// SysTick interrupt handler
#[cfg(target_arch = "arm")]
#[no_mangle]
pub extern "C" fn SysTick() {
    os_tick_handler();
}
