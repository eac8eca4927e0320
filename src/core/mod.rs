//! immortal Core Module
//!
//! This module contains the pieces shared by every layer:
//! - Configuration management
//! - Error types and handling

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{ProtocolConfig, DISCOVERY_VAR, WATCHDOG_BIN_NAME, WATCHDOG_BIN_VAR};
pub use error::{ImmortalError, Result, SchedulerError};
