//! Worker Error Types

use thiserror::Error;

/// Errors raised by the supervision core.
///
/// Lifecycle misuse (`AlreadyInitialized`, `NotStarted`, `AlreadyRunning`,
/// `TreeRunning`) is fatal to the caller and never retried. `Cancelled` is the
/// orderly exit of a loop, not a failure.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{0}: already initialized")]
    AlreadyInitialized(String),

    #[error("{0}: worker is not started")]
    NotStarted(String),

    #[error("{0}: worker is already running")]
    AlreadyRunning(String),

    #[error("{0}: sub-workers cannot be added while the tree is running")]
    TreeRunning(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}
