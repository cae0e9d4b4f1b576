//! Cyclic task example: a 100-tick control loop with overrun reporting,
//! and a one-shot task restarted by a broadcast event

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use defmt::{info, warn};
use ucsched::event::{EventId, EventVector, WaitSpec};
use ucsched::task::{os_overrun_count, StackRegion, StartCondition, TaskDescriptor};
use ucsched::time::{os_time_dly_cycle, os_time_dly_hmsm, os_time_get};
use ucsched::types::{OsStkElement, TaskId};
use ucsched::{os_send, os_task_register};

const PERIOD: u32 = 100;
const REPORT: EventId = EventId::at(0);

static mut CONTROL_STK: [OsStkElement; 256] = [0; 256];
static mut REPORT_STK: [OsStkElement; 256] = [0; 256];

static mut CONTROL_ID: Option<TaskId> = None;

fn control_task(first: EventVector) {
    info!("[Ctl] first activation {} at tick {}", first, os_time_get());

    let mut cycles = 0u32;
    loop {
        cycles += 1;
        // Every tenth cycle takes longer than the period.
        if cycles % 10 == 0 {
            let _ = os_time_dly_hmsm(0, 0, 0, 150);
            let _ = os_send(REPORT.into());
        }
        let _ = os_time_dly_cycle(PERIOD);
    }
}

/// Runs once per report event; returning restarts it
fn report_task(_: EventVector) {
    if let Some(id) = unsafe { CONTROL_ID } {
        match os_overrun_count(id, true) {
            Ok(0) => info!("[Rep] no overruns"),
            Ok(n) => warn!("[Rep] {} overruns", n),
            Err(e) => warn!("[Rep] {}", e),
        }
    }
}

#[entry]
fn main() -> ! {
    info!("Cyclic Demo");

    ucsched::os_init().expect("OS init failed");

    let control_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(CONTROL_STK) });
    let report_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(REPORT_STK) });

    let control = TaskDescriptor::new("Ctl", control_task, 8, control_stk)
        .start(StartCondition::Wait(WaitSpec::cycle(PERIOD)));
    let report = TaskDescriptor::new("Rep", report_task, 3, report_stk)
        .start(StartCondition::Wait(WaitSpec::any(REPORT.into())));

    let id = os_task_register(control).unwrap();
    unsafe { CONTROL_ID = Some(id) };
    os_task_register(report).unwrap();

    info!("Starting...");
    ucsched::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::wfi();
    }
}
