//! Task registry
//!
//! Tasks are registered once, before the scheduler starts, and keep their
//! identity for the lifetime of the system. A task whose body returns is
//! not destroyed: its context is reset and it waits for its start
//! condition again.

mod tcb;

pub use tcb::{Link, Tcb};

use crate::config::{CFG_PRIO_MAX, CFG_STK_SIZE_MIN, CFG_TASK_MAX};
use crate::critical::{critical_section, is_isr_context};
use crate::error::{OsError, OsResult};
use crate::event::{EventVector, Timer, WaitSpec};
use crate::kernel::{self, SCHED};
use crate::port::Port;
use crate::sched::Scheduler;
use crate::types::{OsOverrunCtr, OsPrio, OsStkElement, OsTick, TaskId};
use crate::{debug, error};

/// Task entry point
///
/// The argument is the event vector that made the task run for the first
/// time (its start events, or empty for tasks that start ready). Returning
/// from the entry point restarts the task.
pub type TaskFn = fn(EventVector);

/// Stack memory handed to a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackRegion {
    base: *mut OsStkElement,
    len: usize,
}

impl StackRegion {
    pub const EMPTY: StackRegion = StackRegion {
        base: core::ptr::null_mut(),
        len: 0,
    };

    /// Dedicate a static buffer to one task
    pub fn new(stack: &'static mut [OsStkElement]) -> Self {
        StackRegion {
            base: stack.as_mut_ptr(),
            len: stack.len(),
        }
    }

    /// Describe a stack by its raw parts
    ///
    /// # Safety
    /// `base..base + len` must be valid, exclusively owned memory for the
    /// lifetime of the task.
    pub const unsafe fn from_raw(base: *mut OsStkElement, len: usize) -> Self {
        StackRegion { base, len }
    }

    #[inline]
    pub fn base(&self) -> *mut OsStkElement {
        self.base
    }

    /// Size in words
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// How a task enters the scheduler at registration (and after a restart)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartCondition {
    /// Ready immediately
    Ready,
    /// Suspended until the condition is met. For a cyclic task the timeout
    /// of an absolute timer is the offset of its first activation.
    Wait(WaitSpec),
}

/// Everything needed to register a task
pub struct TaskDescriptor {
    /// Task name for diagnostics
    pub name: &'static str,
    /// Entry point
    pub entry: Option<TaskFn>,
    /// Priority class (higher is more urgent)
    pub prio: OsPrio,
    /// Stack memory
    pub stack: StackRegion,
    /// Round-robin budget in ticks, 0 disables time slicing for this task
    pub time_quanta: OsTick,
    /// Initial state
    pub start: StartCondition,
}

impl TaskDescriptor {
    /// Descriptor for a task that starts ready without time slicing
    pub fn new(name: &'static str, entry: TaskFn, prio: OsPrio, stack: StackRegion) -> Self {
        TaskDescriptor {
            name,
            entry: Some(entry),
            prio,
            stack,
            time_quanta: 0,
            start: StartCondition::Ready,
        }
    }

    pub fn time_quanta(mut self, ticks: OsTick) -> Self {
        self.time_quanta = ticks;
        self
    }

    pub fn start(mut self, start: StartCondition) -> Self {
        self.start = start;
        self
    }

    fn validate(&self) -> OsResult<TaskFn> {
        let entry = self.entry.ok_or(OsError::TaskEntryNull)?;

        if self.prio as usize >= CFG_PRIO_MAX {
            return Err(OsError::PrioInvalid);
        }

        if self.stack.len() < CFG_STK_SIZE_MIN {
            return Err(OsError::StkSizeInvalid);
        }

        if let StartCondition::Wait(spec) = self.start {
            spec.validate()?;
            match spec.timer() {
                None if spec.timeout != 0 => return Err(OsError::TimeoutWithoutTimer),
                Some(Timer::Absolute) if spec.timeout == 0 => {
                    return Err(OsError::TimeoutInvalid)
                }
                _ => {}
            }
        }

        Ok(entry)
    }
}

impl<P: Port> Scheduler<P> {
    /// Register a task
    ///
    /// Ids are handed out in registration order.
    ///
    /// # Returns
    /// * `Ok(TaskId)` - Task registered
    /// * `Err(OsError::OsRunning)` - Scheduler already started
    /// * `Err(OsError::TaskNoMoreTcb)` - Task table full
    /// * `Err(OsError::TaskEntryNull)` - No entry point
    /// * `Err(OsError::PrioInvalid)` - Priority out of range
    /// * `Err(OsError::StkSizeInvalid)` - Stack too small
    /// * `Err(OsError::TimeoutWithoutTimer)` - First-activation offset on a
    ///   task that requests no timer
    /// * `Err(OsError::TimeoutInvalid)` - Cyclic task with a zero offset
    pub fn register(&mut self, desc: TaskDescriptor) -> OsResult<TaskId> {
        if self.running {
            return Err(OsError::OsRunning);
        }

        if self.task_count >= CFG_TASK_MAX {
            return Err(OsError::TaskNoMoreTcb);
        }

        let entry = desc.validate().inspect_err(|e| {
            error!("task {} rejected: {}", desc.name, e);
        })?;

        let id = TaskId::from_index(self.task_count);
        self.task_count += 1;

        let tcb = &mut self.tcbs[id.index()];
        *tcb = Tcb::EMPTY;
        tcb.name = desc.name;
        tcb.entry = Some(entry);
        tcb.prio = desc.prio;
        tcb.stack = desc.stack;
        tcb.start = desc.start;
        tcb.time_quanta = desc.time_quanta;
        tcb.reset_dynamic();

        self.port.init_context(id, entry, desc.stack);
        self.enter_start_condition(id);

        debug!("task {} registered as {} at prio {}", desc.name, id, desc.prio);
        Ok(id)
    }

    /// Restart the active task from its entry point
    ///
    /// Dynamic state is cleared, the port recreates the context and the
    /// task waits for its start condition again. The cyclic time base and
    /// the overrun counter survive.
    pub fn terminate(&mut self) -> OsResult<()> {
        if !self.running {
            return Err(OsError::OsNotRunning);
        }

        let id = self.active;
        if id.is_idle() {
            return Err(OsError::TaskExitIdle);
        }

        self.rdy_list_remove(id);

        let tcb = &mut self.tcbs[id.index()];
        tcb.reset_dynamic();
        let (entry, stack) = (tcb.entry, tcb.stack);
        if let Some(entry) = entry {
            self.port.init_context(id, entry, stack);
        }
        self.enter_start_condition(id);

        debug!("task {} restarted", id);
        self.dispatch(true);
        Ok(())
    }

    fn enter_start_condition(&mut self, id: TaskId) {
        match self.tcbs[id.index()].start {
            StartCondition::Ready => self.make_ready(id),
            StartCondition::Wait(spec) => self.suspend(id, spec),
        }
    }

    /// Cyclic activations of a task that were already late
    ///
    /// # Arguments
    /// * `id` - Task to query
    /// * `reset` - Clear the counter after reading it
    pub fn overrun_count(&mut self, id: TaskId, reset: bool) -> OsResult<OsOverrunCtr> {
        self.check_task(id)?;
        let tcb = &mut self.tcbs[id.index()];
        let count = tcb.overruns;
        if reset {
            tcb.overruns = 0;
        }
        Ok(count)
    }

    /// Name given at registration
    pub fn task_name(&self, id: TaskId) -> OsResult<&'static str> {
        if id.is_idle() {
            return Ok("Idle");
        }
        self.check_task(id)?;
        Ok(self.tcbs[id.index()].name)
    }

    /// Priority class of a task
    pub fn task_prio(&self, id: TaskId) -> OsResult<OsPrio> {
        self.check_task(id)?;
        Ok(self.tcbs[id.index()].prio)
    }
}

/// Register a task with the kernel instance
///
/// # Example
/// ```ignore
/// static mut WORKER_STK: [OsStkElement; 256] = [0; 256];
///
/// fn worker(_: EventVector) {
///     loop { /* ... */ }
/// }
///
/// // In main, after os_init():
/// let stack = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(WORKER_STK) });
/// os_task_register(TaskDescriptor::new("Worker", worker, 5, stack))
///     .expect("task registration failed");
/// ```
pub fn os_task_register(desc: TaskDescriptor) -> OsResult<TaskId> {
    if !kernel::KERNEL.is_initialized() {
        return Err(OsError::OsNotInit);
    }

    if is_isr_context() {
        return Err(OsError::TaskCreateIsr);
    }

    critical_section(|cs| SCHED.get(cs).register(desc))
}

/// Restart the calling task
///
/// Reached through the port's return trampoline when a task body returns.
/// On a real target the switch is taken when the critical section ends and
/// this function never returns to its caller's frame.
pub fn os_task_exit() -> OsResult<()> {
    critical_section(|cs| SCHED.get(cs).terminate())
}

/// Read (and optionally clear) a task's overrun counter
pub fn os_overrun_count(id: TaskId, reset: bool) -> OsResult<OsOverrunCtr> {
    critical_section(|cs| SCHED.get(cs).overrun_count(id, reset))
}
