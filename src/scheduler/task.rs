//! Recurring tasks
//!
//! A [`Task`] owns an operation, a fixed cadence and a cleanup hook. The
//! cleanup hook runs exactly once, when the task is dropped.

use std::fmt;
use std::time::{Duration, Instant};

use super::uid::TaskId;
use super::SchedulerError;

/// What the scheduler should do with a task after running it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Advance `next_run` by the interval and queue the task again
    Reschedule,
    /// Drop the task (its cleanup runs)
    Discard,
}

/// Task body
pub type Operation = Box<dyn FnMut() -> TaskOutcome + Send>;

/// Hook invoked with the task id when the task is dropped
pub type Cleanup = Box<dyn FnOnce(TaskId) + Send>;

/// Recurring unit of work
pub struct Task {
    id: TaskId,
    interval: Duration,
    next_run: Instant,
    operation: Operation,
    cleanup: Option<Cleanup>,
}

impl Task {
    /// Create a task first due at its creation time.
    ///
    /// Fails on a zero interval or when no id can be generated.
    pub fn new<F, C>(operation: F, interval: Duration, cleanup: C) -> Result<Self, SchedulerError>
    where
        F: FnMut() -> TaskOutcome + Send + 'static,
        C: FnOnce(TaskId) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let id = TaskId::generate()?;

        Ok(Self {
            id,
            interval,
            next_run: id.created_at(),
            operation: Box::new(operation),
            cleanup: Some(Box::new(cleanup)),
        })
    }

    /// Invoke the operation. Panics inside the operation are not caught.
    pub fn run(&mut self) -> TaskOutcome {
        (self.operation)()
    }

    /// Move `next_run` one interval forward from its previous value
    pub fn update_next_run(&mut self) {
        self.next_run += self.interval;
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_run(&self) -> Instant {
        self.next_run
    }

    /// True if this task is due strictly before `other`
    pub fn is_before(&self, other: &Task) -> bool {
        self.next_run < other.next_run
    }

    pub fn matches(&self, id: TaskId) -> bool {
        self.id == id
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup(self.id);
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("next_run", &self.next_run)
            .finish_non_exhaustive()
    }
}
