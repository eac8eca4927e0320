//! Task identifiers
//!
//! A [`TaskId`] pairs a monotonic timestamp with a process-wide counter, so
//! two ids taken in the same clock tick still differ.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lazy_static::lazy_static;

use super::SchedulerError;

lazy_static! {
    /// Reference point for the monotonic component of every id
    static ref EPOCH: Instant = Instant::now();
}

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    /// Nanoseconds since the process epoch
    stamp_ns: u64,
    /// Disambiguating counter, never 0 for a generated id
    seq: u64,
}

impl TaskId {
    /// Sentinel that never equals a generated id
    pub const INVALID: TaskId = TaskId { stamp_ns: 0, seq: 0 };

    /// Generate a fresh id
    pub fn generate() -> Result<Self, SchedulerError> {
        let seq = COUNTER
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |seq| seq.checked_add(1))
            .map_err(|_| SchedulerError::IdExhausted)?;

        let elapsed = EPOCH.elapsed();
        let stamp_ns = u64::try_from(elapsed.as_nanos()).map_err(|_| SchedulerError::IdExhausted)?;

        Ok(Self { stamp_ns, seq })
    }

    /// The moment this id was generated
    pub fn created_at(&self) -> Instant {
        *EPOCH + Duration::from_nanos(self.stamp_ns)
    }

    pub fn is_valid(&self) -> bool {
        self.seq != 0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stamp_ns, self.seq)
    }
}
