//! Global kernel state and initialization
//!
//! This module owns the one scheduler instance of the system and exposes
//! the task-facing API. Every call enters a critical section, so tick,
//! send, wait and registration never interleave.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::{CFG_CPU_CLOCK_HZ, CFG_IDLE_STK_SIZE, CFG_TICK_RATE_HZ};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::event::{EventVector, WaitMode, WaitSpec};
use crate::os::cs_cell::CsCell;
use crate::port::{Port, TargetPort};
use crate::sched::{Scheduler, WaitOutcome};
use crate::task::StackRegion;
use crate::types::{OsStkElement, OsTick, TaskId};
use crate::info;

// ============ Kernel State Structures ============

/// Atomic kernel flags, readable without entering a critical section
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    tick_counter: AtomicU32,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            tick_counter: AtomicU32::new(0),
        }
    }

    /// Check if the OS is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if OS is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Get current tick count
    #[inline(always)]
    pub fn tick_get(&self) -> OsTick {
        self.tick_counter.load(Ordering::Relaxed)
    }

    /// Mirror the scheduler's clock
    #[inline(always)]
    pub(crate) fn set_tick(&self, now: OsTick) {
        self.tick_counter.store(now, Ordering::Relaxed);
    }

    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Global scheduler instance
pub(crate) static SCHED: CsCell<Scheduler<TargetPort>> =
    CsCell::new(Scheduler::new(TargetPort::new()));

/// Idle context stack
static mut IDLE_STK: [OsStkElement; CFG_IDLE_STK_SIZE] = [0; CFG_IDLE_STK_SIZE];

/// Background context, runs whenever no task is ready
fn os_idle_task(_: EventVector) {
    loop {
        #[cfg(target_arch = "arm")]
        cortex_m::asm::wfi();
        #[cfg(not(target_arch = "arm"))]
        core::hint::spin_loop();
    }
}

// ============ Public API ============

/// Initialize the kernel
///
/// Must be called before any other OS function. Creates the idle context.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_init() -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        *sched = Scheduler::new(TargetPort::new());

        let idle_stk = unsafe {
            StackRegion::from_raw(
                core::ptr::addr_of_mut!(IDLE_STK) as *mut OsStkElement,
                CFG_IDLE_STK_SIZE,
            )
        };
        sched.port_mut().init_context(TaskId::IDLE, os_idle_task, idle_stk);

        KERNEL.set_tick(0);
        KERNEL.set_initialized(true);
    });

    Ok(())
}

/// Start multitasking
///
/// Transfers the CPU to the highest priority ready task. On a real target
/// this function does not return.
///
/// # Returns
/// * `Err(OsError::OsNotInit)` - OS not initialized
/// * `Err(OsError::OsRunning)` - OS is already running
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if KERNEL.is_running() {
        return Err(OsError::OsRunning);
    }

    crate::port::os_cpu_systick_init(CFG_CPU_CLOCK_HZ / CFG_TICK_RATE_HZ);

    // The first switch is taken when this section ends.
    critical_section(|cs| {
        let first = SCHED.get(cs).start()?;
        KERNEL.set_running(true);
        info!("scheduler started, first task {}", first);
        unsafe { crate::port::os_start_high_rdy() };
        Ok(())
    })
}

/// Wait for events
///
/// # Arguments
/// * `events` - Events to wait for (at least one)
/// * `mode` - Resume on any event, or on all non-timer events
/// * `timeout` - Ticks for the timer requested in `events`
///
/// # Returns
/// The events delivered to the calling task.
pub fn os_wait(events: EventVector, mode: WaitMode, timeout: OsTick) -> OsResult<EventVector> {
    os_wait_spec(WaitSpec { events, mode, timeout })
}

/// Wait for a prepared condition
pub fn os_wait_spec(spec: WaitSpec) -> OsResult<EventVector> {
    if is_isr_context() {
        return Err(OsError::WaitIsr);
    }

    let (caller, outcome) = critical_section(|cs| {
        let sched = SCHED.get(cs);
        let caller = sched.active();
        sched.wait(spec).map(|outcome| (caller, outcome))
    })?;

    match outcome {
        WaitOutcome::Ready(events) => Ok(events),
        // The switch has been taken when the critical section ended; by the
        // time execution gets here the caller has been resumed.
        WaitOutcome::Suspended => {
            Ok(critical_section(|cs| SCHED.get(cs).take_delivered(caller)))
        }
    }
}

/// Post events
///
/// Broadcast events, semaphore units and released mutexes go to the waiting
/// tasks. If a more urgent task became ready the caller is preempted and
/// returns from here once it is selected again.
pub fn os_send(events: EventVector) -> OsResult<()> {
    critical_section(|cs| SCHED.get(cs).send(events))
}

/// Task owning the CPU
pub fn os_task_self() -> TaskId {
    critical_section(|cs| SCHED.get(cs).active())
}

/// Number of context switches since start
pub fn os_ctx_sw_count() -> u32 {
    critical_section(|cs| SCHED.get(cs).context_switches())
}
