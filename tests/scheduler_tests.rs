//! Scheduler behavior tests
//!
//! Drive a [`Scheduler`] through its trigger points (tick, send, wait) with
//! a port that records every switch, the way a target would see them.

use proptest::prelude::*;
use ucsched::config::{CFG_PRIO_MAX, CFG_TASK_MAX};
use ucsched::error::OsError;
use ucsched::event::*;
use ucsched::task::{StackRegion, StartCondition, TaskDescriptor, TaskFn};
use ucsched::types::{OsPrio, TaskId, TaskState};
#[cfg(feature = "sem")]
use ucsched::types::OsSemCtr;
use ucsched::{Port, Scheduler, WaitOutcome};

#[derive(Default)]
struct RecordingPort {
    inits: Vec<TaskId>,
    switches: Vec<(TaskId, Option<EventVector>)>,
}

impl Port for RecordingPort {
    fn init_context(&mut self, task: TaskId, _entry: TaskFn, _stack: StackRegion) {
        self.inits.push(task);
    }

    fn switch_to(&mut self, task: TaskId, payload: Option<EventVector>) {
        self.switches.push((task, payload));
    }
}

const EV0: EventId = EventId::at(0);
const EV1: EventId = EventId::at(1);
const EV2: EventId = EventId::at(2);
#[cfg(feature = "sem")]
const S0: SemId = SemId::at(0);
#[cfg(feature = "mutex")]
const M0: MutexId = MutexId::at(0);

fn body(_: EventVector) {}

fn stack(words: usize) -> StackRegion {
    StackRegion::new(Box::leak(vec![0; words].into_boxed_slice()))
}

fn desc(name: &'static str, prio: OsPrio) -> TaskDescriptor {
    TaskDescriptor::new(name, body, prio, stack(128))
}

fn new_sched() -> Scheduler<RecordingPort> {
    Scheduler::new(RecordingPort::default())
}

fn last_switch(sched: &Scheduler<RecordingPort>) -> Option<(TaskId, Option<EventVector>)> {
    sched.port().switches.last().copied()
}

fn ticks(sched: &mut Scheduler<RecordingPort>, n: usize) {
    for _ in 0..n {
        sched.tick();
    }
}

fn waiting_on(sched: &mut Scheduler<RecordingPort>, name: &'static str, prio: OsPrio, ev: EventId) -> TaskId {
    sched
        .register(desc(name, prio).start(StartCondition::Wait(WaitSpec::any(ev.into()))))
        .unwrap()
}

// ============ Registry ============

#[test]
fn test_register_assigns_ids_in_order() {
    let mut sched = new_sched();
    let a = sched.register(desc("A", 3)).unwrap();
    let b = sched.register(desc("B", 7)).unwrap();

    assert_eq!(a.index(), 0);
    assert_eq!(b.index(), 1);
    assert_eq!(sched.task_count(), 2);
    assert_eq!(sched.port().inits, vec![a, b]);
    assert_eq!(sched.task_name(b), Ok("B"));
    assert_eq!(sched.task_prio(b), Ok(7));
}

#[test]
fn test_register_rejects_bad_descriptors() {
    let mut sched = new_sched();

    let mut no_entry = desc("NoEntry", 1);
    no_entry.entry = None;
    assert_eq!(sched.register(no_entry), Err(OsError::TaskEntryNull));

    assert_eq!(
        sched.register(desc("BadPrio", CFG_PRIO_MAX as OsPrio)),
        Err(OsError::PrioInvalid)
    );

    assert_eq!(
        sched.register(TaskDescriptor::new("Tiny", body, 1, stack(8))),
        Err(OsError::StkSizeInvalid)
    );

    let offset_without_timer = WaitSpec::any(EV0.into()).with_timeout(5);
    assert_eq!(
        sched.register(desc("Offset", 1).start(StartCondition::Wait(offset_without_timer))),
        Err(OsError::TimeoutWithoutTimer)
    );

    assert_eq!(
        sched.register(desc("Cyclic", 1).start(StartCondition::Wait(WaitSpec::cycle(0)))),
        Err(OsError::TimeoutInvalid)
    );

    assert_eq!(
        sched.register(desc("Empty", 1).start(StartCondition::Wait(WaitSpec::any(EventVector::EMPTY)))),
        Err(OsError::WaitEmptyMask)
    );

    assert_eq!(sched.task_count(), 0);
}

#[test]
fn test_register_table_full_and_closed_after_start() {
    let mut sched = new_sched();
    for _ in 0..CFG_TASK_MAX {
        sched.register(desc("T", 1)).unwrap();
    }
    assert_eq!(sched.register(desc("Extra", 1)), Err(OsError::TaskNoMoreTcb));

    let mut sched = new_sched();
    sched.register(desc("T", 1)).unwrap();
    sched.start().unwrap();
    assert_eq!(sched.register(desc("Late", 1)), Err(OsError::OsRunning));
    assert_eq!(sched.start(), Err(OsError::OsRunning));
}

#[test]
fn test_unknown_task_queries() {
    let mut sched = new_sched();
    sched.register(desc("T", 1)).unwrap();

    let other = TaskId::IDLE;
    assert_eq!(sched.task_name(other), Ok("Idle"));
    assert_eq!(sched.task_prio(other), Err(OsError::TaskInvalid));
    assert_eq!(sched.overrun_count(other, false), Err(OsError::TaskInvalid));
}

// ============ Activation selector ============

#[test]
fn test_start_runs_most_urgent_task() {
    let mut sched = new_sched();
    let _low = sched.register(desc("Low", 2)).unwrap();
    let high = sched.register(desc("High", 9)).unwrap();

    assert_eq!(sched.start(), Ok(high));
    assert_eq!(sched.active(), high);
    assert_eq!(sched.task_state(high), Ok(TaskState::Active));
    // A fresh task gets its (empty) start events.
    assert_eq!(last_switch(&sched), Some((high, Some(EventVector::EMPTY))));
}

#[test]
fn test_idle_when_nothing_ready() {
    let mut sched = new_sched();
    let t = waiting_on(&mut sched, "Waiter", 4, EV0);

    sched.start().unwrap();
    assert_eq!(sched.active(), TaskId::IDLE);
    assert_eq!(sched.task_state(t), Ok(TaskState::Suspended));
    assert_eq!(last_switch(&sched), Some((TaskId::IDLE, None)));

    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.active(), t);
    assert_eq!(last_switch(&sched), Some((t, Some(EventVector::from(EV0)))));
    assert_eq!(sched.task_state(TaskId::IDLE), Ok(TaskState::Ready));
}

#[test]
fn test_equal_priority_keeps_arrival_order() {
    let mut sched = new_sched();
    let a = sched.register(desc("A", 5)).unwrap();
    let b = sched.register(desc("B", 5)).unwrap();

    sched.start().unwrap();
    assert_eq!(sched.active(), a);
    assert_eq!(sched.ready_tasks(5).collect::<Vec<_>>(), vec![a, b]);
}

// ============ Suspend handler ============

#[test]
fn test_wait_preconditions() {
    let mut sched = new_sched();
    assert_eq!(sched.wait(WaitSpec::any(EV0.into())), Err(OsError::OsNotRunning));

    sched.start().unwrap();
    assert_eq!(sched.active(), TaskId::IDLE);
    assert_eq!(sched.wait(WaitSpec::any(EV0.into())), Err(OsError::WaitIdle));
}

#[test]
fn test_wait_rejects_protocol_violations() {
    let mut sched = new_sched();
    let t = sched.register(desc("T", 1)).unwrap();
    sched.start().unwrap();

    assert_eq!(sched.wait(WaitSpec::any(EventVector::EMPTY)), Err(OsError::WaitEmptyMask));
    assert_eq!(
        sched.wait(WaitSpec::any(EventVector::ABS_TIMER | Timer::Delay)),
        Err(OsError::WaitTimerConflict)
    );
    assert_eq!(
        sched.wait(WaitSpec::all(EventVector::DELAY_TIMER).with_timeout(2)),
        Err(OsError::WaitAllTimerOnly)
    );

    // Rejected calls leave the caller running.
    assert_eq!(sched.active(), t);
    assert_eq!(sched.suspended_tasks().count(), 0);
}

#[test]
#[cfg(all(feature = "sem", feature = "mutex"))]
fn test_wait_rejects_all_mixing_sync_kinds_with_timer() {
    let mut sched = new_sched();
    let t = sched.register(desc("T", 1)).unwrap();
    sched.start().unwrap();

    let mixed = EventVector::from(S0) | M0 | Timer::Delay;
    assert_eq!(sched.wait(WaitSpec::all(mixed).with_timeout(2)), Err(OsError::WaitAmbiguous));

    // Nothing was acquired on the way.
    assert_eq!(sched.active(), t);
    assert_eq!(sched.sem_count(S0), 0);
    assert!(sched.mutex_is_free(M0));
}

#[test]
#[cfg(not(any(feature = "sem", feature = "mutex")))]
fn test_suspended_list_keeps_arrival_order_without_sync_objects() {
    let mut sched = new_sched();
    let low = waiting_on(&mut sched, "Low", 2, EV0);
    let high = waiting_on(&mut sched, "High", 8, EV1);
    let mid = waiting_on(&mut sched, "Mid", 5, EV2);
    assert_eq!(sched.suspended_tasks().collect::<Vec<_>>(), vec![low, high, mid]);

    // Selection still goes by priority.
    sched.start().unwrap();
    assert_eq!(sched.active(), TaskId::IDLE);
    sched.send(EventVector::from(EV0) | EV1 | EV2).unwrap();
    assert_eq!(sched.active(), high);
    assert_eq!(sched.ready_tasks(2).collect::<Vec<_>>(), vec![low]);
}

#[test]
#[cfg(any(feature = "sem", feature = "mutex"))]
fn test_suspended_list_ordered_by_priority() {
    let mut sched = new_sched();
    let low = waiting_on(&mut sched, "Low", 2, EV0);
    let high = waiting_on(&mut sched, "High", 8, EV1);
    let mid = waiting_on(&mut sched, "Mid", 5, EV2);
    let mid2 = waiting_on(&mut sched, "Mid2", 5, EV0);
    assert_eq!(
        sched.suspended_tasks().collect::<Vec<_>>(),
        vec![high, mid, mid2, low]
    );
}

#[test]
fn test_wait_any_broadcast() {
    let mut sched = new_sched();
    let low = sched.register(desc("Low", 1)).unwrap();
    let high = sched.register(desc("High", 6)).unwrap();
    sched.start().unwrap();

    assert_eq!(sched.wait(WaitSpec::any(EventVector::from(EV0) | EV1)), Ok(WaitOutcome::Suspended));
    assert_eq!(sched.active(), low);
    // First run of Low: entered with its empty start events.
    assert_eq!(last_switch(&sched), Some((low, Some(EventVector::EMPTY))));

    sched.send(EV1.into()).unwrap();
    assert_eq!(sched.active(), high);
    assert_eq!(last_switch(&sched), Some((high, Some(EventVector::from(EV1)))));
    assert_eq!(sched.take_delivered(high), EventVector::from(EV1));
    assert_eq!(sched.take_delivered(high), EventVector::EMPTY);

    // Low was preempted inside send and resumes without a payload.
    sched.wait(WaitSpec::any(EV0.into())).unwrap();
    assert_eq!(last_switch(&sched), Some((low, None)));
}

#[test]
fn test_broadcast_reaches_every_waiter() {
    let mut sched = new_sched();
    let sender = sched.register(desc("Sender", 1)).unwrap();
    let a = waiting_on(&mut sched, "A", 3, EV2);
    let b = waiting_on(&mut sched, "B", 4, EV2);
    sched.start().unwrap();
    assert_eq!(sched.active(), sender);

    sched.send(EV2.into()).unwrap();
    assert_eq!(sched.active(), b);
    assert_eq!(sched.task_state(a), Ok(TaskState::Ready));
    assert_eq!(sched.suspended_tasks().count(), 0);
}

#[test]
fn test_send_ignores_tasks_not_asking() {
    let mut sched = new_sched();
    let _sender = sched.register(desc("Sender", 1)).unwrap();
    let t = waiting_on(&mut sched, "T", 3, EV0);
    sched.start().unwrap();

    sched.send(EV1.into()).unwrap();
    assert_eq!(sched.task_state(t), Ok(TaskState::Suspended));
}

#[test]
fn test_wait_all_collects_every_event() {
    let mut sched = new_sched();
    let low = sched.register(desc("Low", 1)).unwrap();
    let high = sched.register(desc("High", 6)).unwrap();
    sched.start().unwrap();

    sched.wait(WaitSpec::all(EventVector::from(EV0) | EV1)).unwrap();
    assert_eq!(sched.active(), low);

    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.task_state(high), Ok(TaskState::Suspended));

    sched.send(EV1.into()).unwrap();
    assert_eq!(sched.active(), high);
    assert_eq!(sched.take_delivered(high), EventVector::from(EV0) | EV1);
}

#[test]
fn test_wait_all_timeout_escape() {
    let mut sched = new_sched();
    let _low = sched.register(desc("Low", 1)).unwrap();
    let high = sched.register(desc("High", 6)).unwrap();
    sched.start().unwrap();

    let spec = WaitSpec::all(EventVector::from(EV0) | EV1 | Timer::Delay).with_timeout(3);
    sched.wait(spec).unwrap();
    sched.send(EV0.into()).unwrap();

    ticks(&mut sched, 3);
    assert_eq!(sched.task_state(high), Ok(TaskState::Suspended));

    sched.tick();
    assert_eq!(sched.active(), high);
    assert_eq!(sched.take_delivered(high), EventVector::from(EV0) | Timer::Delay);
}

#[test]
fn test_event_before_timeout_cancels_delay() {
    let mut sched = new_sched();
    let _low = sched.register(desc("Low", 1)).unwrap();
    let high = sched.register(desc("High", 6)).unwrap();
    sched.start().unwrap();

    sched.wait(WaitSpec::any(EventVector::from(EV0) | Timer::Delay).with_timeout(10)).unwrap();
    ticks(&mut sched, 2);
    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.take_delivered(high), EventVector::from(EV0));

    // The delay timer does not fire into a later wait.
    sched.wait(WaitSpec::any(EV1.into())).unwrap();
    ticks(&mut sched, 20);
    assert_eq!(sched.task_state(high), Ok(TaskState::Suspended));
}

#[test]
fn test_delay_compensates_unaligned_call() {
    let mut sched = new_sched();
    let t = sched.register(desc("Delayed", 3)).unwrap();
    sched.start().unwrap();

    assert_eq!(sched.wait(WaitSpec::delay(5)), Ok(WaitOutcome::Suspended));
    assert_eq!(sched.active(), TaskId::IDLE);

    ticks(&mut sched, 4);
    assert_eq!(sched.task_state(t), Ok(TaskState::Suspended));
    sched.tick();
    assert_eq!(sched.task_state(t), Ok(TaskState::Suspended));

    sched.tick();
    assert_eq!(sched.active(), t);
    assert_eq!(last_switch(&sched), Some((t, Some(EventVector::DELAY_TIMER))));
    assert_eq!(sched.now(), 6);
}

#[test]
fn test_timeout_ignored_without_timer_bit() {
    let mut sched = new_sched();
    let _low = sched.register(desc("Low", 1)).unwrap();
    let high = sched.register(desc("High", 6)).unwrap();
    sched.start().unwrap();

    sched.wait(WaitSpec::any(EV0.into()).with_timeout(2)).unwrap();
    ticks(&mut sched, 10);
    assert_eq!(sched.task_state(high), Ok(TaskState::Suspended));
}

// ============ Cyclic tasks ============

#[test]
fn test_cyclic_start_offset_and_period() {
    let mut sched = new_sched();
    let cyc = sched
        .register(desc("Cyclic", 4).start(StartCondition::Wait(WaitSpec::cycle(10))))
        .unwrap();
    sched.start().unwrap();

    ticks(&mut sched, 9);
    assert_eq!(sched.task_state(cyc), Ok(TaskState::Suspended));
    sched.tick();
    assert_eq!(sched.active(), cyc);
    assert_eq!(last_switch(&sched), Some((cyc, Some(EventVector::ABS_TIMER))));

    // The period counts from the previous due time, not from now.
    ticks(&mut sched, 3);
    sched.wait(WaitSpec::cycle(10)).unwrap();
    ticks(&mut sched, 6);
    assert_eq!(sched.task_state(cyc), Ok(TaskState::Suspended));
    sched.tick();
    assert_eq!(sched.active(), cyc);
    assert_eq!(sched.now(), 20);
    assert_eq!(sched.overrun_count(cyc, false), Ok(0));
}

#[test]
fn test_cyclic_overrun_clamps_to_next_tick() {
    let mut sched = new_sched();
    let cyc = sched
        .register(desc("Cyclic", 4).start(StartCondition::Wait(WaitSpec::cycle(100))))
        .unwrap();
    sched.start().unwrap();

    ticks(&mut sched, 100);
    assert_eq!(sched.active(), cyc);

    // Busy past the next due time (103).
    ticks(&mut sched, 5);
    assert_eq!(sched.now(), 105);

    sched.wait(WaitSpec::cycle(3)).unwrap();
    assert_eq!(sched.overrun_count(cyc, false), Ok(1));
    assert_eq!(sched.task_state(cyc), Ok(TaskState::Suspended));

    sched.tick();
    assert_eq!(sched.active(), cyc);
    assert_eq!(sched.now(), 106);

    assert_eq!(sched.overrun_count(cyc, true), Ok(1));
    assert_eq!(sched.overrun_count(cyc, false), Ok(0));
}

// ============ Round robin ============

#[test]
fn test_round_robin_within_priority() {
    let mut sched = new_sched();
    let a = sched.register(desc("A", 10).time_quanta(3)).unwrap();
    let b = sched.register(desc("B", 10).time_quanta(3)).unwrap();
    let c = sched.register(desc("C", 5).time_quanta(3)).unwrap();
    sched.start().unwrap();

    let mut trace = Vec::new();
    for _ in 0..12 {
        sched.tick();
        trace.push(sched.active());
        assert_ne!(sched.active(), c);
    }

    assert_eq!(trace, vec![a, a, b, b, b, a, a, a, b, b, b, a]);
    assert_eq!(sched.task_state(c), Ok(TaskState::Ready));
}

#[test]
fn test_no_round_robin_without_budget() {
    let mut sched = new_sched();
    let a = sched.register(desc("A", 10)).unwrap();
    let _b = sched.register(desc("B", 10)).unwrap();
    sched.start().unwrap();

    ticks(&mut sched, 50);
    assert_eq!(sched.active(), a);
}

// ============ Semaphores ============

#[test]
#[cfg(feature = "sem")]
fn test_semaphore_round_trip() {
    let mut sched = new_sched();
    let producer = sched.register(desc("Producer", 1)).unwrap();
    let consumer = sched
        .register(desc("Consumer", 5).start(StartCondition::Wait(WaitSpec::any(S0.into()))))
        .unwrap();
    sched.sem_init(S0, 0).unwrap();
    sched.start().unwrap();
    assert_eq!(sched.active(), producer);

    // Unit goes straight to the waiter.
    sched.send(S0.into()).unwrap();
    assert_eq!(sched.active(), consumer);
    assert_eq!(sched.sem_count(S0), 0);

    sched.wait(WaitSpec::any(S0.into())).unwrap();
    assert_eq!(sched.active(), producer);

    sched.send(S0.into()).unwrap();
    assert_eq!(sched.active(), consumer);
    sched.wait(WaitSpec::delay(1)).unwrap();
    assert_eq!(sched.active(), producer);

    // Nobody waits for this unit; it is parked in the counter.
    sched.send(S0.into()).unwrap();
    assert_eq!(sched.sem_count(S0), 1);

    ticks(&mut sched, 2);
    assert_eq!(sched.active(), consumer);
    assert_eq!(sched.wait(WaitSpec::any(S0.into())), Ok(WaitOutcome::Ready(S0.into())));
    assert_eq!(sched.sem_count(S0), 0);
}

#[test]
#[cfg(feature = "sem")]
fn test_semaphore_unit_goes_to_one_waiter() {
    let mut sched = new_sched();
    let _producer = sched.register(desc("Producer", 1)).unwrap();
    let first = sched
        .register(desc("First", 4).start(StartCondition::Wait(WaitSpec::any(S0.into()))))
        .unwrap();
    let second = sched
        .register(desc("Second", 6).start(StartCondition::Wait(WaitSpec::any(S0.into()))))
        .unwrap();
    sched.start().unwrap();

    sched.send(S0.into()).unwrap();
    assert_eq!(sched.active(), second);
    assert_eq!(sched.task_state(first), Ok(TaskState::Suspended));
    assert_eq!(sched.sem_count(S0), 0);
}

#[test]
#[cfg(feature = "sem")]
fn test_sem_init_only_before_start() {
    let mut sched = new_sched();
    sched.sem_init(S0, 3).unwrap();
    assert_eq!(sched.sem_count(S0), 3);
    sched.start().unwrap();
    assert_eq!(sched.sem_init(S0, 1), Err(OsError::OsRunning));
}

#[test]
#[cfg(feature = "sem")]
fn test_semaphore_skips_waiter_already_holding_unit() {
    let mut sched = new_sched();
    let hi = sched.register(desc("Hi", 6)).unwrap();
    let lo = sched.register(desc("Lo", 4)).unwrap();
    let _sender = sched.register(desc("Sender", 1)).unwrap();
    sched.sem_init(S0, 1).unwrap();
    sched.start().unwrap();

    // Hi takes the parked unit and keeps waiting for EV0.
    assert_eq!(
        sched.wait(WaitSpec::all(EventVector::from(S0) | EV0)),
        Ok(WaitOutcome::Suspended)
    );
    assert_eq!(sched.active(), lo);
    assert_eq!(sched.sem_count(S0), 0);

    assert_eq!(sched.wait(WaitSpec::any(S0.into())), Ok(WaitOutcome::Suspended));
    assert_eq!(sched.suspended_tasks().collect::<Vec<_>>(), vec![hi, lo]);

    // Hi is first in line but already holds a unit of S0.
    sched.send(S0.into()).unwrap();
    assert_eq!(sched.active(), lo);
    assert_eq!(sched.task_state(hi), Ok(TaskState::Suspended));
    assert_eq!(last_switch(&sched), Some((lo, Some(EventVector::from(S0)))));
    assert_eq!(sched.sem_count(S0), 0);

    // Its ALL condition completes with the broadcast alone.
    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.active(), hi);
    assert_eq!(last_switch(&sched), Some((hi, Some(EventVector::from(S0) | EV0))));
}

#[test]
#[cfg(feature = "sem")]
fn test_semaphore_counter_saturates_through_send() {
    let mut sched = new_sched();
    let t = sched.register(desc("T", 1)).unwrap();
    sched.sem_init(S0, OsSemCtr::MAX).unwrap();
    sched.start().unwrap();

    sched.send(S0.into()).unwrap();
    sched.send(S0.into()).unwrap();
    assert_eq!(sched.sem_count(S0), OsSemCtr::MAX);
    assert_eq!(sched.active(), t);

    assert_eq!(sched.wait(WaitSpec::any(S0.into())), Ok(WaitOutcome::Ready(S0.into())));
    assert_eq!(sched.sem_count(S0), OsSemCtr::MAX - 1);
}

// ============ Mutexes ============

#[test]
#[cfg(feature = "mutex")]
fn test_mutex_goes_to_most_urgent_waiter() {
    let mut sched = new_sched();
    let holder = sched.register(desc("Holder", 1)).unwrap();
    let t2 = waiting_on(&mut sched, "T2", 3, EV0);
    let t1 = waiting_on(&mut sched, "T1", 5, EV1);
    sched.start().unwrap();

    assert_eq!(sched.wait(WaitSpec::any(M0.into())), Ok(WaitOutcome::Ready(M0.into())));
    assert!(!sched.mutex_is_free(M0));

    // T2 asks first, T1 later.
    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.active(), t2);
    sched.wait(WaitSpec::any(M0.into())).unwrap();
    assert_eq!(sched.active(), holder);

    sched.send(EV1.into()).unwrap();
    assert_eq!(sched.active(), t1);
    sched.wait(WaitSpec::any(M0.into())).unwrap();
    assert_eq!(sched.active(), holder);

    sched.send(M0.into()).unwrap();
    assert_eq!(sched.active(), t1);
    assert_eq!(sched.take_delivered(t1), EventVector::from(M0));
    assert_eq!(sched.task_state(t2), Ok(TaskState::Suspended));
    assert!(!sched.mutex_is_free(M0));
}

#[test]
#[cfg(feature = "mutex")]
fn test_mutex_fifo_among_equal_priority() {
    let mut sched = new_sched();
    let holder = sched.register(desc("Holder", 1)).unwrap();
    let early = waiting_on(&mut sched, "Early", 4, EV0);
    let late = waiting_on(&mut sched, "Late", 4, EV1);
    sched.start().unwrap();

    sched.wait(WaitSpec::any(M0.into())).unwrap();

    sched.send(EV0.into()).unwrap();
    sched.wait(WaitSpec::any(M0.into())).unwrap();
    sched.send(EV1.into()).unwrap();
    sched.wait(WaitSpec::any(M0.into())).unwrap();
    assert_eq!(sched.active(), holder);
    assert_eq!(sched.suspended_tasks().collect::<Vec<_>>(), vec![early, late]);

    sched.send(M0.into()).unwrap();
    assert_eq!(sched.active(), early);
    assert_eq!(sched.task_state(late), Ok(TaskState::Suspended));

    // Release by the new holder hands it on.
    sched.send(M0.into()).unwrap();
    assert_eq!(sched.task_state(late), Ok(TaskState::Ready));
    assert!(!sched.mutex_is_free(M0));
}

#[test]
#[cfg(feature = "mutex")]
fn test_mutex_release_without_waiter_and_double_release() {
    let mut sched = new_sched();
    let _t = sched.register(desc("T", 1)).unwrap();
    sched.start().unwrap();

    sched.wait(WaitSpec::any(M0.into())).unwrap();
    sched.send(M0.into()).unwrap();
    assert!(sched.mutex_is_free(M0));

    assert_eq!(sched.send(M0.into()), Err(OsError::MutexNotHeld));
    assert!(sched.mutex_is_free(M0));
}

// ============ Event dispatcher ============

#[test]
fn test_send_rejects_timer_events() {
    let mut sched = new_sched();
    let t = waiting_on(&mut sched, "T", 2, EV0);
    sched.start().unwrap();

    assert_eq!(sched.send(EventVector::DELAY_TIMER), Err(OsError::SendTimerEvent));
    assert_eq!(sched.send(EventVector::from(EV0) | Timer::Absolute), Err(OsError::SendTimerEvent));
    assert_eq!(sched.task_state(t), Ok(TaskState::Suspended));
}

#[test]
fn test_send_before_start_makes_ready_without_switch() {
    let mut sched = new_sched();
    let t = waiting_on(&mut sched, "T", 2, EV0);

    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.task_state(t), Ok(TaskState::Ready));
    assert!(sched.port().switches.is_empty());

    sched.start().unwrap();
    assert_eq!(last_switch(&sched), Some((t, Some(EventVector::from(EV0)))));
}

#[test]
fn test_tick_ignored_before_start() {
    let mut sched = new_sched();
    sched.register(desc("T", 2)).unwrap();
    assert!(!sched.tick());
    assert_eq!(sched.now(), 0);
}

// ============ Restart ============

#[test]
fn test_terminate_restarts_task() {
    let mut sched = new_sched();
    let t = sched.register(desc("T", 5)).unwrap();
    let w = waiting_on(&mut sched, "W", 7, EV0);
    sched.start().unwrap();
    assert_eq!(sched.active(), t);

    sched.terminate().unwrap();
    assert_eq!(sched.port().inits, vec![t, w, t]);
    assert_eq!(sched.active(), t);
    assert_eq!(last_switch(&sched), Some((t, Some(EventVector::EMPTY))));

    sched.send(EV0.into()).unwrap();
    assert_eq!(sched.active(), w);
    sched.terminate().unwrap();
    assert_eq!(sched.task_state(w), Ok(TaskState::Suspended));
    assert_eq!(sched.active(), t);
}

#[test]
fn test_terminate_from_idle_fails() {
    let mut sched = new_sched();
    assert_eq!(sched.terminate(), Err(OsError::OsNotRunning));
    sched.start().unwrap();
    assert_eq!(sched.terminate(), Err(OsError::TaskExitIdle));
}

#[test]
fn test_context_switch_counter() {
    let mut sched = new_sched();
    sched.register(desc("A", 1)).unwrap();
    waiting_on(&mut sched, "B", 4, EV0);
    sched.start().unwrap();
    assert_eq!(sched.context_switches(), 1);

    sched.send(EV0.into()).unwrap();
    sched.wait(WaitSpec::any(EV0.into())).unwrap();
    assert_eq!(sched.context_switches(), 3);
    assert_eq!(sched.port().switches.len(), 3);
}

// ============ Invariants ============

/// Semaphore and mutex bit `k`, or nothing when the kind is compiled out
fn sem_bit(k: u8) -> EventVector {
    SemId::new(k).map(EventVector::from).unwrap_or(EventVector::EMPTY)
}

fn mutex_bit(k: u8) -> EventVector {
    MutexId::new(k).map(EventVector::from).unwrap_or(EventVector::EMPTY)
}

#[derive(Debug, Clone)]
enum Op {
    Tick,
    Send(u8),
    WaitAny(u8),
    Delay(u8),
    Exit,
    /// Release `S_k`, plus `M_k` if the active task holds it
    Release(u8),
    WaitSync { all: bool, sem: u8, mutex: u8, ev: u8 },
    Cycle(u8),
    AllOrDelay(u8, u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Tick),
        2 => (0u8..3).prop_map(Op::Send),
        2 => (0u8..3).prop_map(Op::WaitAny),
        1 => (0u8..4).prop_map(Op::Delay),
        1 => Just(Op::Exit),
        2 => (0u8..2).prop_map(Op::Release),
        2 => (any::<bool>(), 0u8..2, 0u8..2, 0u8..3)
            .prop_map(|(all, sem, mutex, ev)| Op::WaitSync { all, sem, mutex, ev }),
        1 => (1u8..6).prop_map(Op::Cycle),
        1 => (0u8..3, 0u8..4).prop_map(|(ev, t)| Op::AllOrDelay(ev, t)),
    ]
}

/// What the test can know about semaphores and mutexes from outside
#[derive(Default)]
struct SyncModel {
    sent: [u64; 2],
    holder: [Option<TaskId>; 2],
    seen: usize,
}

impl SyncModel {
    fn took(&mut self, task: TaskId, got: EventVector) {
        for k in 0..2u8 {
            if got.intersects(mutex_bit(k)) {
                self.holder[k as usize] = Some(task);
            }
        }
    }

    /// Record mutexes handed over through switch payloads
    fn observe(&mut self, sched: &Scheduler<RecordingPort>) {
        let switches = &sched.port().switches;
        for &(task, payload) in &switches[self.seen..] {
            if let Some(got) = payload {
                self.took(task, got);
            }
        }
        self.seen = switches.len();
    }

    /// Bits the active task may send for index `k`
    fn release(&mut self, active: TaskId, k: u8) -> EventVector {
        let mut bits = sem_bit(k);
        if !bits.is_empty() {
            self.sent[k as usize] += 1;
        }
        if self.holder[k as usize] == Some(active) && !mutex_bit(k).is_empty() {
            bits |= mutex_bit(k);
            self.holder[k as usize] = None;
        }
        bits
    }
}

fn check_invariants(sched: &Scheduler<RecordingPort>, n: usize) {
    // Active is always the selector's choice.
    assert_eq!(sched.active(), sched.select());

    let mut seen = vec![0usize; n];
    for prio in 0..CFG_PRIO_MAX as OsPrio {
        for id in sched.ready_tasks(prio) {
            assert_eq!(sched.task_prio(id), Ok(prio));
            seen[id.index()] += 1;
        }
    }
    for id in sched.suspended_tasks() {
        assert_eq!(sched.task_state(id), Ok(TaskState::Suspended));
        seen[id.index()] += 1;
    }
    // Each task is in exactly one list.
    assert!(seen.iter().all(|&count| count == 1), "{seen:?}");
}

#[allow(unused_variables)]
fn check_sync_model(sched: &Scheduler<RecordingPort>, model: &SyncModel) {
    for k in 0..2u8 {
        // Counters never hold more units than were ever sent.
        #[cfg(feature = "sem")]
        assert!(
            sched.sem_count(SemId::at(k)) as u64 <= model.sent[k as usize],
            "S{k}: {} > {}",
            sched.sem_count(SemId::at(k)),
            model.sent[k as usize]
        );
        #[cfg(feature = "mutex")]
        if let Some(task) = model.holder[k as usize] {
            assert!(!sched.mutex_is_free(MutexId::at(k)), "M{k} free while {task:?} holds it");
        }
    }
}

proptest! {
    #[test]
    fn prop_lists_partition_tasks(prios in prop::collection::vec(0u8..4, 1..6), ops in prop::collection::vec(op(), 0..80)) {
        let mut sched = new_sched();
        for (i, prio) in prios.iter().enumerate() {
            let d = desc("P", *prio).time_quanta(i as u32 % 3);
            let d = if i % 2 == 1 {
                d.start(StartCondition::Wait(WaitSpec::any(EventId::at(i as u8 % 3).into())))
            } else {
                d
            };
            sched.register(d).unwrap();
        }
        let mut model = SyncModel::default();
        sched.start().unwrap();
        model.observe(&sched);
        check_invariants(&sched, prios.len());

        for op in ops {
            let active = sched.active();
            let idle = active.is_idle();
            let outcome = match op {
                Op::Tick => {
                    sched.tick();
                    None
                }
                Op::Send(k) => {
                    sched.send(EventId::at(k).into()).unwrap();
                    None
                }
                Op::Release(k) => {
                    let bits = model.release(active, k);
                    sched.send(bits).unwrap();
                    None
                }
                Op::WaitAny(k) if !idle => Some(sched.wait(WaitSpec::any(EventId::at(k).into())).unwrap()),
                Op::Delay(t) if !idle => Some(sched.wait(WaitSpec::delay(t as u32)).unwrap()),
                Op::WaitSync { all, sem, mutex, ev } if !idle => {
                    let bits = sem_bit(sem) | mutex_bit(mutex) | EventId::at(ev);
                    let spec = if all { WaitSpec::all(bits) } else { WaitSpec::any(bits) };
                    Some(sched.wait(spec).unwrap())
                }
                Op::Cycle(t) if !idle => Some(sched.wait(WaitSpec::cycle(t as u32)).unwrap()),
                Op::AllOrDelay(ev, t) if !idle => {
                    let bits = sem_bit(ev % 2) | EventId::at(ev) | Timer::Delay;
                    Some(sched.wait(WaitSpec::all(bits).with_timeout(t as u32)).unwrap())
                }
                Op::Exit if !idle => {
                    sched.terminate().unwrap();
                    None
                }
                _ => None,
            };
            if let Some(WaitOutcome::Ready(got)) = outcome {
                prop_assert_eq!(sched.active(), active);
                model.took(active, got);
            }
            model.observe(&sched);
            check_invariants(&sched, prios.len());
            check_sync_model(&sched, &model);
        }
    }
}
