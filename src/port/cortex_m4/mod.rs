//! Cortex-M4 port implementation
//!
//! Provides context switching via PendSV exception handler.
//!
//! Each task (and the idle context) owns one [`TaskContext`] slot. A slot
//! marked fresh gets its initial exception frame built inside PendSV, when
//! no code is running on that stack any more. This is what lets a task
//! that returned from its entry point restart on its own stack.

#![allow(named_asm_labels)]

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;

use super::Port;
use crate::config::CFG_TASK_MAX;
use crate::event::EventVector;
use crate::task::{StackRegion, TaskFn};
use crate::types::{OsStkElement, TaskId};
use crate::error;

/// Saved context of one task
#[derive(Clone, Copy)]
#[repr(C)]
pub struct TaskContext {
    /// Saved process stack pointer
    sp: *mut OsStkElement,
    entry: Option<TaskFn>,
    stack: StackRegion,
    /// Entry argument of a fresh context
    arg: u32,
    /// Initial frame not built yet
    fresh: bool,
}

impl TaskContext {
    const EMPTY: TaskContext = TaskContext {
        sp: core::ptr::null_mut(),
        entry: None,
        stack: StackRegion::EMPTY,
        arg: 0,
        fresh: false,
    };
}

/// Context pointers shared with the PendSV handler
///
/// `ctx_cur` must stay the first field: PendSV reads it to tell the very
/// first switch (nothing to save) from the others.
#[repr(C)]
pub struct CpuState {
    pub ctx_cur: *mut TaskContext,
    pub ctx_next: *mut TaskContext,
}

/// Context slots, indexed by task id; the last one belongs to the idle context
static mut CONTEXTS: [TaskContext; CFG_TASK_MAX + 1] = [TaskContext::EMPTY; CFG_TASK_MAX + 1];

#[no_mangle]
pub static mut CPU_STATE: CpuState = CpuState {
    ctx_cur: core::ptr::null_mut(),
    ctx_next: core::ptr::null_mut(),
};

/// Port driving the context slots
pub struct PendSvPort;

impl PendSvPort {
    pub const fn new() -> Self {
        PendSvPort
    }
}

impl Port for PendSvPort {
    fn init_context(&mut self, task: TaskId, entry: TaskFn, stack: StackRegion) {
        // Runs inside a critical section; PendSV cannot observe a half
        // written slot.
        unsafe {
            let ctx = &mut *core::ptr::addr_of_mut!(CONTEXTS[task.index()]);
            ctx.entry = Some(entry);
            ctx.stack = stack;
            ctx.arg = 0;
            ctx.fresh = true;
        }
    }

    fn switch_to(&mut self, task: TaskId, payload: Option<EventVector>) {
        unsafe {
            let ctx = core::ptr::addr_of_mut!(CONTEXTS[task.index()]);
            if (*ctx).fresh {
                if let Some(events) = payload {
                    (*ctx).arg = events.bits();
                }
            }
            CPU_STATE.ctx_next = ctx;
        }
        os_ctx_sw();
    }
}

/// Initialize SysTick timer for system tick generation
///
/// # Arguments
/// * `cnts` - Reload value
///
/// # Example
/// For 16MHz clock with 1000Hz tick rate: cnts = 16_000_000 / 1000 = 16_000
pub fn os_cpu_systick_init(cnts: u32) {
    let mut p = unsafe { cortex_m::Peripherals::steal() };

    p.SYST.set_reload(cnts - 1);
    p.SYST.clear_current();
    p.SYST.set_clock_source(SystClkSource::Core);
    p.SYST.enable_interrupt();
    p.SYST.enable_counter();
}

/// Prepare the first switch
///
/// Called inside the critical section that started the scheduler. The
/// pending PendSV is taken as soon as that section ends and the calling
/// thread never runs again.
pub unsafe fn os_start_high_rdy() {
    unsafe {
        let mut scb = cortex_m::Peripherals::steal().SCB;

        // Set PendSV and SysTick priority to lowest
        scb.set_priority(SystemHandler::PendSV, 0xF0);
        scb.set_priority(SystemHandler::SysTick, 0xF0);

        CPU_STATE.ctx_cur = core::ptr::null_mut();
    }
    os_ctx_sw();
}

/// Request a context switch; taken when interrupts are enabled again
#[inline(always)]
fn os_ctx_sw() {
    cortex_m::peripheral::SCB::set_pendsv();
}

/// Context structure stored on stack
#[repr(C, align(4))]
struct UcStk {
    r4: u32,
    r5: u32,
    r6: u32,
    r7: u32,
    r8: u32,
    r9: u32,
    r10: u32,
    r11: u32,
    exc_return: u32, // LR value for exception return
    r0: u32,
    r1: u32,
    r2: u32,
    r3: u32,
    r12: u32,
    lr: u32,
    pc: u32,
    xpsr: u32,
}
const CONTEXT_STACK_SIZE: usize = 17;

/// Build the initial exception frame of a task
///
/// `arg` lands in r0, which is the task's event vector argument.
unsafe fn os_task_stk_init(entry: TaskFn, arg: u32, stack: StackRegion) -> *mut OsStkElement {
    unsafe {
        let stk_top = stack.base().add(stack.len());
        let stk_aligned = ((stk_top as usize) & !7) as *mut u32;

        let frame_ptr = stk_aligned.sub(CONTEXT_STACK_SIZE) as *mut UcStk;

        frame_ptr.write(UcStk {
            r4: 0x04040404,
            r5: 0x05050505,
            r6: 0x06060606,
            r7: 0x07070707,
            r8: 0x08080808,
            r9: 0x09090909,
            r10: 0x10101010,
            r11: 0x11111111,
            exc_return: 0xFFFF_FFFD,
            r0: arg,
            r1: 0,
            r2: 0,
            r3: 0,
            r12: 0,
            lr: os_task_return as *const () as u32,
            pc: (entry as usize as u32) | 1,
            xpsr: 0x0100_0000,
        });

        // Return pointer 4 bytes before frame to match PendSV's "add r0, r0, #4"
        (frame_ptr as *mut u32).sub(1) as *mut OsStkElement
    }
}

/// Helper called from PendSV: store the outgoing stack pointer and return
/// the incoming one
#[inline(never)]
#[no_mangle]
unsafe extern "C" fn pendsv_switch_context(cur_sp: *mut u32) -> *mut u32 {
    unsafe {
        let cur = CPU_STATE.ctx_cur;
        // A fresh slot belongs to a task that restarted; its old frames
        // are dropped.
        if !cur.is_null() && !(*cur).fresh {
            (*cur).sp = cur_sp;
        }

        let next = CPU_STATE.ctx_next;
        if next.is_null() {
            return core::ptr::null_mut();
        }

        if (*next).fresh {
            if let Some(entry) = (*next).entry {
                (*next).sp = os_task_stk_init(entry, (*next).arg, (*next).stack);
            }
            (*next).fresh = false;
        }

        CPU_STATE.ctx_cur = next;
        (*next).sp
    }
}

/// PendSV exception handler - performs full context switch
///
/// 1. Save R4-R11, LR to current task's PSP (skip if first task)
/// 2. Call pendsv_switch_context to swap context slots
/// 3. Restore R4-R11, LR from new task's stack
/// 4. Exception return
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "cpsid i",
        "dsb",
        "isb",

        "mrs r0, psp",

        "ldr r1, ={cpu_state}",
        "ldr r1, [r1]",
        "cbz r1, 1f",

        "stmdb r0!, {{r4-r11, lr}}",

        "sub r0, r0, #4",

        "1:",
        "bl pendsv_switch_context",

        "cbz r0, 2f",
        "add r0, r0, #4",
        "ldmia r0!, {{r4-r11, lr}}",

        "msr psp, r0",

        "2:",
        "cpsie i",
        "dsb",
        "isb",

        "bx lr",

        cpu_state = sym CPU_STATE,
    );
}

/// Return trampoline of every task entry point
///
/// A task whose body returns restarts from its entry point once its start
/// condition holds again.
#[no_mangle]
extern "C" fn os_task_return() -> ! {
    if let Err(err) = crate::task::os_task_exit() {
        error!("task body returned, restart failed: {}", err);
    }
    loop {
        cortex_m::asm::wfi();
    }
}
