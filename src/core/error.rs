//! Error types for immortal
//!
//! One error enum per layer; the protocol enum wraps the lower ones.

use std::path::PathBuf;

use thiserror::Error;

use crate::scheduler::TaskId;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ImmortalError>;

/// Errors raised while protecting a process
#[derive(Error, Debug)]
pub enum ImmortalError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to change the signal mask: {0}")]
    SignalMask(#[source] nix::Error),

    #[error("Failed to install signal handlers: {0}")]
    SignalSetup(#[source] nix::Error),

    #[error("Failed to send {signal} to {target}: {source}")]
    SignalSend {
        signal: &'static str,
        target: i32,
        #[source]
        source: nix::Error,
    },

    #[error("Cannot build command line: {0}")]
    CommandLine(String),

    #[error("Failed to spawn supervisor thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error("Semaphore wait failed: {0}")]
    SemaphoreWait(String),

    #[error("Failed to revive peer {program:?}: {source}")]
    Revival {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("This process is already protected")]
    AlreadyImmortal,

    #[error("This process is not protected")]
    NotImmortal,

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Scheduler-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Task interval must be greater than zero")]
    ZeroInterval,

    #[error("Task id space exhausted")]
    IdExhausted,

    #[error("No task with id {0}")]
    TaskNotFound(TaskId),
}

impl ImmortalError {
    /// Numeric code for callers that report through an exit status
    pub fn code(&self) -> i32 {
        match self {
            ImmortalError::InvalidConfig(_) | ImmortalError::ConfigFile(_) => 2,
            ImmortalError::SemaphoreWait(_) => 5,
            ImmortalError::SignalMask(_) => 3,
            ImmortalError::ThreadSpawn(_) => 6,
            ImmortalError::CommandLine(_) => 7,
            ImmortalError::Revival { .. } => 8,
            ImmortalError::SignalSetup(_) | ImmortalError::SignalSend { .. } => 9,
            ImmortalError::AlreadyImmortal | ImmortalError::NotImmortal => 10,
            ImmortalError::Scheduler(_) | ImmortalError::Io(_) => 1,
        }
    }
}
