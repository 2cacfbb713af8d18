//! In-memory gateways
//!
//! Process-local implementations of the store and address provider. They
//! enforce the same contracts as a database-backed store (idempotent insert,
//! status machine) and are used by the demo binary and the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::{DepositAddressProvider, TransferStore};
use crate::transfer::error::TransferError;
use crate::transfer::state::{TransferKind, TransferStatus};
use crate::transfer::types::{Transfer, TransferDbId, TransferUpdate};

#[derive(Debug, Clone)]
struct StoredTransfer {
    transfer: Transfer,
    block_number: Option<i64>,
    block_time: Option<DateTime<Utc>>,
    history: Vec<TransferStatus>,
}

#[derive(Default)]
struct StoreInner {
    records: BTreeMap<TransferDbId, StoredTransfer>,
    /// Idempotency keys are global, not scoped per account
    by_key: HashMap<String, TransferDbId>,
    last_id: TransferDbId,
}

impl StoreInner {
    fn insert(&mut self, transfer: &Transfer) -> TransferDbId {
        self.last_id += 1;
        let id = self.last_id;

        let mut stored = transfer.clone();
        stored.id = id;
        self.by_key.insert(stored.transfer_id.clone(), id);
        self.records.insert(
            id,
            StoredTransfer {
                history: vec![stored.status],
                transfer: stored,
                block_number: None,
                block_time: None,
            },
        );
        id
    }
}

/// Transfer store kept in process memory.
#[derive(Default)]
pub struct InMemoryTransferStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, bypassing the idempotency check and the status
    /// machine. Used to load fixtures that model a previous process run.
    pub async fn seed(&self, transfer: Transfer) -> TransferDbId {
        self.inner.write().await.insert(&transfer)
    }

    pub async fn get(&self, id: TransferDbId) -> Option<Transfer> {
        self.inner
            .read()
            .await
            .records
            .get(&id)
            .map(|r| r.transfer.clone())
    }

    pub async fn get_by_transfer_id(&self, transfer_id: &str) -> Option<Transfer> {
        let inner = self.inner.read().await;
        let id = inner.by_key.get(transfer_id)?;
        inner.records.get(id).map(|r| r.transfer.clone())
    }

    /// Every status the record has been written with, in order.
    pub async fn status_history(&self, id: TransferDbId) -> Vec<TransferStatus> {
        self.inner
            .read()
            .await
            .records
            .get(&id)
            .map(|r| r.history.clone())
            .unwrap_or_default()
    }

    pub async fn block(&self, id: TransferDbId) -> Option<(i64, DateTime<Utc>)> {
        let inner = self.inner.read().await;
        let record = inner.records.get(&id)?;
        record.block_number.zip(record.block_time)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn list_transfers(
        &self,
        kind: TransferKind,
        statuses: &[TransferStatus],
    ) -> Result<Vec<Transfer>, TransferError> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .map(|r| &r.transfer)
            .filter(|t| t.kind == kind && statuses.contains(&t.status))
            .cloned()
            .collect())
    }

    async fn insert_if_absent(
        &self,
        transfer: &Transfer,
    ) -> Result<Option<TransferDbId>, TransferError> {
        let mut inner = self.inner.write().await;
        if inner.by_key.contains_key(&transfer.transfer_id) {
            debug!(transfer_id = %transfer.transfer_id, "Duplicate transfer_id, insert skipped");
            return Ok(None);
        }
        Ok(Some(inner.insert(transfer)))
    }

    async fn update_transfer(
        &self,
        id: TransferDbId,
        update: TransferUpdate,
    ) -> Result<(), TransferError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .records
            .get_mut(&id)
            .ok_or(TransferError::TransferNotFound(id))?;

        if let Some(next) = update.status {
            let current = record.transfer.status;
            if !current.can_transition_to(next) {
                return Err(TransferError::InvalidStateTransition(format!(
                    "{} -> {} (transfer {})",
                    current, next, record.transfer.transfer_id
                )));
            }
            record.transfer.status = next;
            record.history.push(next);
        }
        if let Some(tx_hash) = update.tx_hash {
            record.transfer.tx_hash = Some(tx_hash);
        }
        if let Some(error_text) = update.error_text {
            record.transfer.error_text = Some(error_text);
        }
        if update.block_number.is_some() {
            record.block_number = update.block_number;
        }
        if update.block_time.is_some() {
            record.block_time = update.block_time;
        }
        Ok(())
    }
}

/// Address provider with no backing pool. Tracks initialization only.
#[derive(Debug, Default)]
pub struct InMemoryDepositAddressProvider {
    initialized: AtomicBool,
    init_count: AtomicUsize,
}

impl InMemoryDepositAddressProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DepositAddressProvider for InMemoryDepositAddressProvider {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> Result<(), TransferError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }
}
