//! Scheduler core
//!
//! Contains the kernel instance, the scheduler object, the task registry,
//! the event model and tick handling.

pub mod config;
pub mod critical;
pub mod error;
pub mod event;
pub mod kernel;
pub mod prio;
pub mod types;
pub mod task;
pub mod sched;
pub mod time;
pub mod cs_cell;
