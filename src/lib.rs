//! immortal - mutual liveness supervision for a process
//!
//! This crate provides:
//! - Arena-backed linked list, sorted list and priority queue containers
//! - A single-threaded scheduler of recurring timed tasks
//! - A watchdog protocol in which an application and a watchdog process
//!   heartbeat each other and revive whichever one goes silent
//! - Structured logging shared by both processes
//!
//! ```no_run
//! let argv: Vec<String> = std::env::args().collect();
//! immortal::become_immortal(&argv, 1, 3)?;
//! // ... protected work ...
//! immortal::do_not_resuscitate()?;
//! # Ok::<(), immortal::ImmortalError>(())
//! ```

pub mod collections;
pub mod core;
pub mod logging;
pub mod scheduler;
pub mod watchdog;

// Re-export commonly used items
pub use crate::core::config::ProtocolConfig;
pub use crate::core::error::{ImmortalError, Result};
pub use scheduler::{RunStatus, Scheduler, TaskId, TaskOutcome};
pub use watchdog::{become_immortal, do_not_resuscitate, Immortal};
