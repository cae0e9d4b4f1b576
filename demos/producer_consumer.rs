//! Producer-Consumer example with a semaphore and a mutex

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use ucsched::event::{EventVector, MutexId, SemId};
use ucsched::sem::{os_sem_count, os_sem_init};
use ucsched::task::{StackRegion, TaskDescriptor};
use ucsched::time::os_time_dly;
use ucsched::types::OsStkElement;
use ucsched::{os_send, os_task_register, os_wait, WaitMode};

const ITEMS: SemId = SemId::at(0);
const CONSOLE: MutexId = MutexId::at(0);

static PRODUCED: AtomicU32 = AtomicU32::new(0);
static CONSUMED: AtomicU32 = AtomicU32::new(0);

static mut PRODUCER_STK: [OsStkElement; 256] = [0; 256];
static mut CONSUMER_STK: [OsStkElement; 256] = [0; 256];

fn producer_task(_: EventVector) {
    loop {
        let n = PRODUCED.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = os_send(ITEMS.into());

        let _ = os_wait(CONSOLE.into(), WaitMode::Any, 0);
        info!("[P] produced #{}, {} queued", n, os_sem_count(ITEMS));
        let _ = os_send(CONSOLE.into());

        let _ = os_time_dly(200);
    }
}

fn consumer_task(_: EventVector) {
    loop {
        let _ = os_wait(ITEMS.into(), WaitMode::Any, 0);
        let n = CONSUMED.fetch_add(1, Ordering::Relaxed) + 1;

        let _ = os_wait(CONSOLE.into(), WaitMode::Any, 0);
        info!("[C] consumed #{}", n);
        let _ = os_send(CONSOLE.into());

        for _ in 0..10_000 {
            cortex_m::asm::nop();
        }
    }
}

#[entry]
fn main() -> ! {
    info!("Producer-Consumer Demo");

    ucsched::os_init().expect("OS init failed");
    os_sem_init(ITEMS, 0).unwrap();

    let producer_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(PRODUCER_STK) });
    let consumer_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(CONSUMER_STK) });

    os_task_register(TaskDescriptor::new("P", producer_task, 5, producer_stk)).unwrap();
    os_task_register(TaskDescriptor::new("C", consumer_task, 10, consumer_stk)).unwrap();

    info!("Starting...");
    ucsched::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::wfi();
    }
}
