//! Transfer Status Definitions
//!
//! Status IDs are stable for storage as SMALLINT.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transfer status machine
///
/// ```text
/// NEW → SENDING_WITHDRAWAL → SENT_WITHDRAWAL
///              ↓ ↺
///            FAILED
/// ```
///
/// `SENDING_WITHDRAWAL → SENDING_WITHDRAWAL` is the re-entry taken when a
/// checkpointed transfer is attempted again after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferStatus {
    /// Persisted, never attempted
    New = 0,

    /// In-flight checkpoint written before the submission attempt
    SendingWithdrawal = 10,

    /// Terminal: submission accepted, tx hash recorded
    SentWithdrawal = 20,

    /// Terminal: submission failed, back office notified
    Failed = -10,
}

impl TransferStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::SentWithdrawal | TransferStatus::Failed)
    }

    pub const ALL: [TransferStatus; 4] = [
        TransferStatus::New,
        TransferStatus::SendingWithdrawal,
        TransferStatus::SentWithdrawal,
        TransferStatus::Failed,
    ];

    /// Statuses a restarted sender picks up again.
    pub const RESUMABLE: [TransferStatus; 2] =
        [TransferStatus::New, TransferStatus::SendingWithdrawal];

    #[inline]
    pub fn is_resumable(&self) -> bool {
        Self::RESUMABLE.contains(self)
    }

    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::New, TransferStatus::SendingWithdrawal)
                | (
                    TransferStatus::SendingWithdrawal,
                    TransferStatus::SendingWithdrawal
                        | TransferStatus::SentWithdrawal
                        | TransferStatus::Failed
                )
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::New),
            10 => Some(TransferStatus::SendingWithdrawal),
            20 => Some(TransferStatus::SentWithdrawal),
            -10 => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::New => "NEW",
            TransferStatus::SendingWithdrawal => "SENDING_WITHDRAWAL",
            TransferStatus::SentWithdrawal => "SENT_WITHDRAWAL",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}

/// Kind of transfer handled by the sender. Only withdrawals today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferKind {
    Withdrawal,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Withdrawal => write!(f, "WITHDRAWAL"),
        }
    }
}
