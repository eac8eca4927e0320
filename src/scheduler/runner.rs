//! Scheduler
//!
//! Runs recurring [`Task`]s in order of their next due time. The loop sleeps
//! until the earliest task is due, runs it, and either reschedules it on its
//! fixed cadence or drops it.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::collections::PQueue;

use super::task::{Task, TaskOutcome};
use super::uid::TaskId;
use super::SchedulerError;

type ByNextRun = fn(&Task, &Task) -> CmpOrdering;

fn by_next_run(a: &Task, b: &Task) -> CmpOrdering {
    if a.is_before(b) {
        CmpOrdering::Less
    } else if b.is_before(a) {
        CmpOrdering::Greater
    } else {
        CmpOrdering::Equal
    }
}

/// Why [`Scheduler::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// A stop was requested; pending tasks were dropped without running
    Stopped,
    /// Every task discarded itself
    Exhausted,
}

/// Cloneable handle that requests a scheduler stop.
///
/// The flag is polled between loop iterations only; a sleep in progress
/// finishes first.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Timed task scheduler
pub struct Scheduler {
    queue: PQueue<Task, ByNextRun>,
    stop: StopHandle,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an idle scheduler with no tasks
    pub fn new() -> Self {
        Self {
            queue: PQueue::new(by_next_run as ByNextRun),
            stop: StopHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    /// Register a recurring task, first due immediately
    pub fn add_task<F, C>(&mut self, interval: Duration, operation: F, cleanup: C) -> Result<TaskId, SchedulerError>
    where
        F: FnMut() -> TaskOutcome + Send + 'static,
        C: FnOnce(TaskId) + Send + 'static,
    {
        let task = Task::new(operation, interval, cleanup)?;
        let id = task.id();
        self.queue.insert(task);
        tracing::trace!(task = %id, ?interval, "Task added");
        Ok(id)
    }

    /// Remove a task by id, running its cleanup
    pub fn remove_task(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        match self.queue.remove_matching(|task| task.matches(id)) {
            Some(task) => {
                drop(task);
                tracing::trace!(task = %id, "Task removed");
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound(id)),
        }
    }

    /// Run until stopped or until no task is left.
    ///
    /// After a stop, every pending task is dropped without being run.
    pub fn run(&mut self) -> RunStatus {
        tracing::debug!(tasks = self.queue.len(), "Scheduler running");

        while !self.stop.is_stopped() {
            let due = match self.queue.peek_min() {
                Some(task) => task.next_run(),
                None => break,
            };

            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }

            let Some(mut task) = self.queue.pop_min() else {
                break;
            };

            match task.run() {
                TaskOutcome::Discard => {
                    tracing::trace!(task = %task.id(), "Task discarded");
                    drop(task);
                }
                TaskOutcome::Reschedule => {
                    task.update_next_run();
                    self.queue.insert(task);
                }
            }
        }

        if self.stop.is_stopped() {
            let pending = self.queue.len();
            self.clear();
            tracing::debug!(dropped = pending, "Scheduler stopped");
            RunStatus::Stopped
        } else {
            tracing::debug!("Scheduler ran out of tasks");
            RunStatus::Exhausted
        }
    }

    /// Request a stop; see [`StopHandle`]
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Handle usable from task operations and other threads
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drop every task, running each cleanup
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.clear();
    }
}
