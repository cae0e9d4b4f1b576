//! Synchronization primitives
//!
//! Semaphores and mutexes are not objects with their own wait lists: they
//! are reserved bits of the event vector. Waiting and releasing go through
//! `wait` and `send`; these modules only hold the state of units nobody is
//! waiting for.

#[cfg(feature = "sem")]
pub mod sem;

#[cfg(feature = "mutex")]
pub mod mutex;
