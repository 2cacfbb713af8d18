//! Gateway Adapters
//!
//! Contracts of the collaborators the sender drives: persistence, chain
//! submission, back office callback and deposit address management.

pub mod memory;
pub mod simulated;

pub use memory::{InMemoryDepositAddressProvider, InMemoryTransferStore};
pub use simulated::SimulatedChainSubmitter;

use async_trait::async_trait;

use super::error::{SubmitError, TransferError};
use super::state::{TransferKind, TransferStatus};
use super::types::{
    SubmitOptions, Transfer, TransferDbId, TransferNotification, TransferResult, TransferUpdate,
};
use crate::worker::CancellationScope;

/// Durable store for transfer records.
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// All transfers of `kind` whose status is one of `statuses`.
    async fn list_transfers(
        &self,
        kind: TransferKind,
        statuses: &[TransferStatus],
    ) -> Result<Vec<Transfer>, TransferError>;

    /// Insert unless a record with the same `transfer_id` exists.
    ///
    /// # Idempotency
    /// Returns the assigned id, or `None` if the key was already taken.
    async fn insert_if_absent(
        &self,
        transfer: &Transfer,
    ) -> Result<Option<TransferDbId>, TransferError>;

    async fn update_transfer(
        &self,
        id: TransferDbId,
        update: TransferUpdate,
    ) -> Result<(), TransferError>;
}

/// Moves the asset on chain.
#[async_trait]
pub trait TransferSubmitter: Send + Sync {
    /// Submit a transfer and return its transaction hash.
    ///
    /// Must honour `scope` promptly; a blank hash counts as a failure.
    async fn submit(
        &self,
        transfer: &Transfer,
        scope: &CancellationScope,
        options: SubmitOptions,
    ) -> Result<String, SubmitError>;
}

/// Back office hook invoked for withdrawals that could not be sent.
///
/// `Ok(None)`, an `Err`, or a result carrying an error are all retried.
#[async_trait]
pub trait TransferCallback: Send + Sync {
    async fn on_transfer_failed(
        &self,
        notification: &TransferNotification,
    ) -> anyhow::Result<Option<TransferResult>>;
}

#[async_trait]
pub trait DepositAddressProvider: Send + Sync {
    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<(), TransferError>;
}
