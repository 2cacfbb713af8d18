//! Transfer Error Types

use thiserror::Error;

use super::state::TransferStatus;
use super::types::TransferDbId;
use crate::worker::WorkerError;

#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Idempotency Errors ===
    #[error("Duplicate request (transfer_id already exists): {0}")]
    DuplicateRequest(String),

    #[error("Transfer already queued: {0}")]
    AlreadyQueued(TransferDbId),

    #[error("Transfer already processed (tx hash recorded): {0}")]
    AlreadyProcessed(String),

    // === Integrity Errors ===
    #[error("Broken transfer {transfer_id}: status {status} cannot be resumed")]
    CorruptedTransfer {
        transfer_id: String,
        status: TransferStatus,
    },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(TransferDbId),

    // === Callback Errors ===
    #[error("Transfer callback is already registered")]
    CallbackAlreadySet,

    #[error("Transfer callback is not registered")]
    CallbackNotSet,

    // === System Errors ===
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl TransferError {
    /// Stable error code for logs and callers
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            TransferError::AlreadyQueued(_) => "ALREADY_QUEUED",
            TransferError::AlreadyProcessed(_) => "ALREADY_PROCESSED",
            TransferError::CorruptedTransfer { .. } => "CORRUPTED_TRANSFER",
            TransferError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::CallbackAlreadySet => "CALLBACK_ALREADY_SET",
            TransferError::CallbackNotSet => "CALLBACK_NOT_SET",
            TransferError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }

    /// Caller should treat the withdrawal as already queued
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            TransferError::DuplicateRequest(_) | TransferError::AlreadyQueued(_)
        )
    }
}

impl From<TransferError> for WorkerError {
    fn from(e: TransferError) -> Self {
        WorkerError::Other(anyhow::Error::new(e))
    }
}

/// Failure reported by the submission gateway.
#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Submission cancelled")]
    Cancelled,
}
