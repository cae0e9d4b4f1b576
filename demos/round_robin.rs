//! Round-robin example: two equal-priority workers share the CPU, a
//! lower-priority task never runs while they are busy

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m_rt::entry;
use defmt::info;
use ucsched::event::EventVector;
use ucsched::task::{StackRegion, TaskDescriptor};
use ucsched::time::os_time_get;
use ucsched::types::OsStkElement;
use ucsched::os_task_register;

static SLICES: [AtomicU32; 2] = [AtomicU32::new(0), AtomicU32::new(0)];
static BACKGROUND: AtomicU32 = AtomicU32::new(0);

static mut WORKER_A_STK: [OsStkElement; 256] = [0; 256];
static mut WORKER_B_STK: [OsStkElement; 256] = [0; 256];
static mut BACKGROUND_STK: [OsStkElement; 256] = [0; 256];

fn spin(slot: usize, name: &str) {
    let mut last = os_time_get();
    loop {
        let now = os_time_get();
        // A jump of more than one tick means the other worker had the CPU.
        if now.wrapping_sub(last) > 1 {
            let n = SLICES[slot].fetch_add(1, Ordering::Relaxed) + 1;
            info!("[{}] slice #{} at tick {}", name, n, now);
        }
        last = now;
    }
}

fn worker_a(_: EventVector) {
    spin(0, "A");
}

fn worker_b(_: EventVector) {
    spin(1, "B");
}

fn background(_: EventVector) {
    loop {
        BACKGROUND.fetch_add(1, Ordering::Relaxed);
    }
}

#[entry]
fn main() -> ! {
    info!("Round-Robin Demo");

    ucsched::os_init().expect("OS init failed");

    let a_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(WORKER_A_STK) });
    let b_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(WORKER_B_STK) });
    let bg_stk = StackRegion::new(unsafe { &mut *core::ptr::addr_of_mut!(BACKGROUND_STK) });

    os_task_register(TaskDescriptor::new("A", worker_a, 10, a_stk).time_quanta(5)).unwrap();
    os_task_register(TaskDescriptor::new("B", worker_b, 10, b_stk).time_quanta(5)).unwrap();
    os_task_register(TaskDescriptor::new("Bg", background, 5, bg_stk)).unwrap();

    info!("Starting...");
    ucsched::os_start().expect("OS start failed");

    loop {
        cortex_m::asm::wfi();
    }
}
