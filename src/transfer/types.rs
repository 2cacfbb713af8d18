//! Transfer Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::state::{TransferKind, TransferStatus};

/// Durable identifier assigned by the store. 0 means "not persisted yet".
pub type TransferDbId = i64;

/// Maximum number of characters kept in `Transfer::error_text`.
pub const MAX_ERROR_TEXT_CHARS: usize = 4000;

/// Withdrawal request submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Caller-supplied idempotency key
    pub transfer_id: String,
    pub account_id: i64,
    pub asset_id: String,
    pub destination_address: String,
    pub amount: Decimal,
}

impl WithdrawalRequest {
    pub fn new(
        transfer_id: impl Into<String>,
        account_id: i64,
        asset_id: impl Into<String>,
        destination_address: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            transfer_id: transfer_id.into(),
            account_id,
            asset_id: asset_id.into(),
            destination_address: destination_address.into(),
            amount,
        }
    }
}

/// Persisted transfer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferDbId,
    pub transfer_id: String,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub account_id: i64,
    pub asset_id: String,
    /// Lower-cased at creation
    pub destination_address: String,
    pub amount: Decimal,
    /// Submission identifier, set once a submission succeeded
    pub tx_hash: Option<String>,
    pub error_text: Option<String>,
}

impl Transfer {
    /// Build a new, not yet persisted withdrawal from a request.
    pub fn new_withdrawal(request: &WithdrawalRequest) -> Self {
        Self {
            id: 0,
            transfer_id: request.transfer_id.clone(),
            kind: TransferKind::Withdrawal,
            status: TransferStatus::New,
            account_id: request.account_id,
            asset_id: request.asset_id.clone(),
            destination_address: request.destination_address.to_lowercase(),
            amount: request.amount,
            tx_hash: None,
            error_text: None,
        }
    }

    /// Non-blank submission identifier, if any.
    pub fn submitted_hash(&self) -> Option<&str> {
        self.tx_hash.as_deref().filter(|h| !h.trim().is_empty())
    }

    /// Append to the error text, keeping at most `MAX_ERROR_TEXT_CHARS`.
    ///
    /// Returns `true` if the text changed.
    pub fn append_error(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let current = self.error_text.get_or_insert_with(String::new);
        let used = current.chars().count();
        if used >= MAX_ERROR_TEXT_CHARS {
            return false;
        }

        current.extend(text.chars().take(MAX_ERROR_TEXT_CHARS - used));
        true
    }
}

/// Partial update applied by `TransferStore::update_transfer`.
///
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferUpdate {
    pub status: Option<TransferStatus>,
    pub tx_hash: Option<String>,
    pub error_text: Option<String>,
    pub block_number: Option<i64>,
    pub block_time: Option<DateTime<Utc>>,
}

impl TransferUpdate {
    pub fn status(status: TransferStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_error_text(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }

    pub fn with_block(mut self, block_number: i64, block_time: DateTime<Utc>) -> Self {
        self.block_number = Some(block_number);
        self.block_time = Some(block_time);
        self
    }
}

/// Flags forwarded to the submission gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitOptions {
    /// Verify the hot wallet can cover the amount before broadcasting
    pub check_balance: bool,
    /// Block until the transaction receipt is available
    pub wait_for_receipt: bool,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            check_balance: true,
            wait_for_receipt: true,
        }
    }
}

/// Payload handed to the back office when a withdrawal could not be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferNotification {
    pub transfer_id: String,
    pub account_id: i64,
    pub asset_id: String,
    pub amount: Decimal,
    pub target_address: String,
    pub status: TransferStatus,
    pub confirmations_required: u32,
    pub reason: Option<String>,
}

impl TransferNotification {
    pub fn for_transfer(transfer: &Transfer, confirmations_required: u32) -> Self {
        Self {
            transfer_id: transfer.transfer_id.clone(),
            account_id: transfer.account_id,
            asset_id: transfer.asset_id.clone(),
            amount: transfer.amount,
            target_address: transfer.destination_address.clone(),
            status: transfer.status,
            confirmations_required,
            reason: transfer.error_text.clone(),
        }
    }
}

/// Answer of the back office callback.
///
/// A result carrying `error` is treated like a failed invocation and retried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub reference: Option<String>,
    pub error: Option<String>,
}

impl TransferResult {
    pub fn accepted(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            reference: None,
            error: Some(error.into()),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
