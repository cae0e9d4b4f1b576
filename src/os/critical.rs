//! Critical section handling
//!
//! Every scheduler trigger point (tick, send, wait, registration) runs inside
//! one of these sections. On a single core this is the only serialization
//! the scheduler needs: its state carries no locks of its own.

use portable_atomic::{AtomicBool, Ordering};

/// Global flag indicating whether a critical section is held
static IN_CRITICAL: AtomicBool = AtomicBool::new(false);

/// RAII guard for critical sections
///
/// Interrupts are masked while the guard lives and restored to their
/// previous state when it is dropped. Any context switch requested inside
/// the section (PendSV) is taken right after the drop.
pub struct CriticalSection {
    was_active: bool,
}

impl CriticalSection {
    /// Enter a critical section by disabling interrupts.
    #[inline(always)]
    pub fn enter() -> Self {
        #[cfg(target_arch = "arm")]
        let was_active = {
            let active = cortex_m::register::primask::read().is_active();
            cortex_m::interrupt::disable();
            active
        };
        #[cfg(not(target_arch = "arm"))]
        let was_active = true;

        let nested = IN_CRITICAL.swap(true, Ordering::Acquire);
        CriticalSection {
            was_active: was_active && !nested,
        }
    }

    /// Check if we're currently in a critical section
    #[inline(always)]
    pub fn is_active() -> bool {
        IN_CRITICAL.load(Ordering::Acquire)
    }
}

impl Drop for CriticalSection {
    #[inline(always)]
    fn drop(&mut self) {
        if self.was_active {
            IN_CRITICAL.store(false, Ordering::Release);

            #[cfg(target_arch = "arm")]
            unsafe { cortex_m::interrupt::enable() };
        }
    }
}

/// Execute a closure with interrupts disabled
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`](crate::os::cs_cell::CsCell)
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        let ipsr: u32;
        unsafe {
            core::arch::asm!(
                "mrs {}, IPSR",
                out(reg) ipsr,
                options(nomem, nostack, preserves_flags)
            );
        }
        ipsr != 0
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_sets_and_clears_flag() {
        let value = critical_section(|_cs| {
            assert!(CriticalSection::is_active());
            7
        });
        assert_eq!(value, 7);
        assert!(!CriticalSection::is_active());
    }
}
