//! Error types for the scheduler
//!
//! Uses Rust's Result pattern instead of C-style error codes. Every error is
//! detected before any scheduler state is touched.

/// Scheduler error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    // ============ ISR errors ============
    /// Cannot wait from an ISR
    WaitIsr = 10001,
    /// Cannot register a task from an ISR
    TaskCreateIsr = 10002,

    // ============ OS state errors ============
    /// OS is not running
    OsNotRunning = 24201,
    /// OS is already running
    OsRunning = 24202,
    /// OS not initialized
    OsNotInit = 24203,

    // ============ Priority errors ============
    /// Priority outside `0..CFG_PRIO_MAX`
    PrioInvalid = 25203,

    // ============ Mutex errors ============
    /// Mutex released while already free
    MutexNotHeld = 22401,

    // ============ Stack errors ============
    /// Stack below `CFG_STK_SIZE_MIN`
    StkSizeInvalid = 28208,

    // ============ Task errors ============
    /// Task has no entry point
    TaskEntryNull = 29013,
    /// Task id does not name a registered task
    TaskInvalid = 29007,
    /// Task table is full
    TaskNoMoreTcb = 29008,
    /// The idle context cannot be terminated
    TaskExitIdle = 29021,

    // ============ Event errors ============
    /// `send` carried a timer bit
    SendTimerEvent = 30001,
    /// `wait` with an empty event mask
    WaitEmptyMask = 30002,
    /// Both timer bits requested at once
    WaitTimerConflict = 30003,
    /// ALL wait without any non-timer event
    WaitAllTimerOnly = 30004,
    /// ALL wait mixing a timer with semaphore and mutex events
    WaitAmbiguous = 30005,
    /// The idle context can never be suspended
    WaitIdle = 30006,

    // ============ Timer errors ============
    /// Timeout given without requesting a timer
    TimeoutWithoutTimer = 29401,
    /// Timeout value not usable for the requested timer
    TimeoutInvalid = 29402,
    /// Invalid time specification
    TimeInvalid = 29403,
}

/// Result type alias for scheduler operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    /// Caller protocol violation, as opposed to a configuration error
    pub fn is_protocol_violation(self) -> bool {
        matches!(
            self,
            OsError::SendTimerEvent
                | OsError::WaitEmptyMask
                | OsError::WaitTimerConflict
                | OsError::WaitAllTimerOnly
                | OsError::WaitAmbiguous
                | OsError::WaitIdle
                | OsError::MutexNotHeld
        )
    }
}
