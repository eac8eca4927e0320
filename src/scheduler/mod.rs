//! Scheduler Module
//!
//! Generic timed-task scheduler: recurring tasks with unique ids, kept in a
//! priority queue ordered by next due time.

pub mod runner;
pub mod task;
pub mod uid;


pub use crate::core::error::SchedulerError;
pub use runner::{RunStatus, Scheduler, StopHandle};
pub use task::{Cleanup, Operation, Task, TaskOutcome};
pub use uid::TaskId;
