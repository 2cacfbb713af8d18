//! Withdrawal Sender
//!
//! Long-running worker that moves queued withdrawals to the chain.
//!
//! Every attempt is checkpointed as `SENDING_WITHDRAWAL` before the submitter
//! is called, so a crash at any point is resolved on the next startup:
//! a checkpointed record with a tx hash is marked sent without resubmission,
//! one without a hash is attempted again.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::adapters::{DepositAddressProvider, TransferCallback, TransferStore, TransferSubmitter};
use super::error::TransferError;
use super::state::{TransferKind, TransferStatus};
use super::types::{
    SubmitOptions, Transfer, TransferDbId, TransferNotification, TransferResult, TransferUpdate,
    WithdrawalRequest,
};
use crate::worker::{CancellationScope, Worker, WorkerError};

/// Configuration for the withdrawal sender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Pause between two processing cycles
    pub poll_interval_ms: u64,
    /// Pause between two failed back office notifications
    pub callback_retry_interval_ms: u64,
    /// Forwarded to the back office with every failure notification
    pub confirmations_required: u32,
    pub submit: SubmitOptions,
}

impl SenderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn callback_retry_interval(&self) -> Duration {
        Duration::from_millis(self.callback_retry_interval_ms)
    }
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            callback_retry_interval_ms: 3_000,
            confirmations_required: 12,
            submit: SubmitOptions::default(),
        }
    }
}

/// Crash-safe withdrawal sender.
///
/// Owns the in-memory pending set. Records enter it through
/// [`enqueue_withdrawal`](Self::enqueue_withdrawal) or startup recovery and
/// leave it once their status is terminal (or they were found already sent).
pub struct TransfersSender {
    config: SenderConfig,
    store: Arc<dyn TransferStore>,
    submitter: Arc<dyn TransferSubmitter>,
    address_provider: Arc<dyn DepositAddressProvider>,
    callback: OnceLock<Arc<dyn TransferCallback>>,
    pending: DashMap<TransferDbId, Transfer>,
}

impl TransfersSender {
    pub fn new(
        config: SenderConfig,
        store: Arc<dyn TransferStore>,
        submitter: Arc<dyn TransferSubmitter>,
        address_provider: Arc<dyn DepositAddressProvider>,
    ) -> Self {
        Self {
            config,
            store,
            submitter,
            address_provider,
            callback: OnceLock::new(),
            pending: DashMap::new(),
        }
    }

    /// Register the back office callback at construction time.
    pub fn with_callback(mut self, callback: Arc<dyn TransferCallback>) -> Self {
        self.callback = OnceLock::from(callback);
        self
    }

    /// Register the back office callback. Only one callback may ever be set.
    pub fn set_transfer_callback(
        &self,
        callback: Arc<dyn TransferCallback>,
    ) -> Result<(), TransferError> {
        self.callback
            .set(callback)
            .map_err(|_| TransferError::CallbackAlreadySet)
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: TransferDbId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Ids currently waiting to be processed, ascending.
    pub fn pending_ids(&self) -> Vec<TransferDbId> {
        let mut ids: Vec<_> = self.pending.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// In-memory view of a pending record.
    pub fn pending_transfer(&self, id: TransferDbId) -> Option<Transfer> {
        self.pending.get(&id).map(|e| e.value().clone())
    }

    /// Persist a new withdrawal and queue it for sending.
    ///
    /// # Idempotency
    /// A `transfer_id` that already exists in the store is rejected with
    /// [`TransferError::DuplicateRequest`] and nothing is queued.
    pub async fn enqueue_withdrawal(
        &self,
        request: WithdrawalRequest,
    ) -> Result<TransferDbId, TransferError> {
        let mut transfer = Transfer::new_withdrawal(&request);

        let Some(id) = self
            .store
            .insert_if_absent(&transfer)
            .await?
            .filter(|id| *id > 0)
        else {
            error!(
                transfer_id = %request.transfer_id,
                account_id = request.account_id,
                "Withdrawal already exists in database and cannot be scheduled again"
            );
            return Err(TransferError::DuplicateRequest(request.transfer_id));
        };
        transfer.id = id;

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                error!(id, transfer_id = %transfer.transfer_id, "Withdrawal is already queued");
                Err(TransferError::AlreadyQueued(id))
            }
            Entry::Vacant(slot) => {
                info!(
                    id,
                    transfer_id = %transfer.transfer_id,
                    asset_id = %transfer.asset_id,
                    amount = %transfer.amount,
                    to = %transfer.destination_address,
                    "Withdrawal enqueued"
                );
                slot.insert(transfer);
                Ok(id)
            }
        }
    }

    /// Load every unfinished withdrawal into the pending set and make sure the
    /// deposit address provider is ready.
    async fn load_pending(&self) -> Result<(), TransferError> {
        info!("Loading unfinished withdrawals");
        let transfers = self
            .store
            .list_transfers(TransferKind::Withdrawal, &TransferStatus::RESUMABLE)
            .await?;

        if let Some(broken) = transfers
            .iter()
            .find(|t| t.kind == TransferKind::Withdrawal && !t.status.is_resumable())
        {
            error!(
                id = broken.id,
                transfer_id = %broken.transfer_id,
                status = %broken.status,
                "Broken withdrawal found while loading"
            );
            return Err(TransferError::CorruptedTransfer {
                transfer_id: broken.transfer_id.clone(),
                status: broken.status,
            });
        }

        for transfer in transfers
            .into_iter()
            .filter(|t| t.kind == TransferKind::Withdrawal)
        {
            let id = transfer.id;
            let status = transfer.status;
            match self.pending.entry(id) {
                Entry::Occupied(_) => {
                    info!(id, %status, "Unfinished withdrawal is already queued");
                }
                Entry::Vacant(slot) => {
                    info!(id, transfer_id = %transfer.transfer_id, %status, "Unfinished withdrawal queued");
                    slot.insert(transfer);
                }
            }
        }

        if !self.address_provider.is_initialized() {
            info!("Initializing deposit address provider");
            self.address_provider.initialize().await?;
            info!("Deposit address provider initialized");
        }

        Ok(())
    }

    /// Run one processing cycle over a snapshot of the pending set.
    ///
    /// Returns the number of records that left the set. Stops early once
    /// `scope` is cancelled.
    pub async fn process_pending(&self, scope: &CancellationScope) -> usize {
        let ids = self.pending_ids();
        let mut finished = 0;

        for id in ids {
            if scope.is_cancelled() {
                debug!("Processing cycle interrupted by cancellation");
                break;
            }

            let Some(transfer) = self.pending_transfer(id) else {
                continue;
            };

            match self.process_transfer(transfer, scope).await {
                Ok(true) => finished += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(id, code = e.code(), error = %e, "Failed to process withdrawal");
                }
            }
        }

        finished
    }

    /// Returns `Ok(true)` when the record left the pending set.
    async fn process_transfer(
        &self,
        mut transfer: Transfer,
        scope: &CancellationScope,
    ) -> Result<bool, TransferError> {
        let id = transfer.id;

        if transfer.status == TransferStatus::Failed {
            warn!(
                id,
                transfer_id = %transfer.transfer_id,
                "Failed withdrawal was not persisted, writing it again"
            );
            self.complete_failure(transfer, scope).await?;
            return Ok(true);
        }

        if let Some(hash) = transfer.submitted_hash() {
            if transfer.status == TransferStatus::SendingWithdrawal {
                info!(
                    id,
                    transfer_id = %transfer.transfer_id,
                    tx_hash = %hash,
                    "Withdrawal was submitted before, marking it as sent"
                );
                self.store
                    .update_transfer(
                        id,
                        TransferUpdate::status(TransferStatus::SentWithdrawal).with_tx_hash(hash),
                    )
                    .await?;
                self.pending.remove(&id);
                return Ok(true);
            }

            let err = TransferError::AlreadyProcessed(transfer.transfer_id.clone());
            error!(
                id,
                status = %transfer.status,
                tx_hash = %hash,
                error = %err,
                "Withdrawal with a recorded tx hash was queued again, dropping it"
            );
            self.pending.remove(&id);
            return Ok(true);
        }

        self.store
            .update_transfer(id, TransferUpdate::status(TransferStatus::SendingWithdrawal))
            .await?;
        transfer.status = TransferStatus::SendingWithdrawal;
        self.pending.insert(id, transfer.clone());

        debug!(id, transfer_id = %transfer.transfer_id, "Submitting withdrawal");
        let failure = match self
            .submitter
            .submit(&transfer, scope, self.config.submit)
            .await
        {
            Ok(hash) if !hash.trim().is_empty() => {
                transfer.tx_hash = Some(hash.clone());
                self.pending.insert(id, transfer.clone());

                self.store
                    .update_transfer(
                        id,
                        TransferUpdate::status(TransferStatus::SentWithdrawal).with_tx_hash(&hash),
                    )
                    .await?;
                self.pending.remove(&id);
                info!(
                    id,
                    transfer_id = %transfer.transfer_id,
                    tx_hash = %hash,
                    "Withdrawal sent"
                );
                return Ok(true);
            }
            Ok(_) => "Submission returned an empty tx hash".to_string(),
            Err(e) => e.to_string(),
        };

        if scope.is_cancelled() {
            warn!(
                id,
                transfer_id = %transfer.transfer_id,
                reason = %failure,
                "Withdrawal interrupted by cancellation, will be resumed on next start"
            );
            return Ok(false);
        }

        self.fail_transfer(transfer, &failure, scope).await?;
        Ok(true)
    }

    async fn fail_transfer(
        &self,
        mut transfer: Transfer,
        reason: &str,
        scope: &CancellationScope,
    ) -> Result<(), TransferError> {
        transfer.status = TransferStatus::Failed;
        transfer.append_error(&format!("[{}] {}\n", Utc::now().to_rfc3339(), reason));
        error!(
            id = transfer.id,
            transfer_id = %transfer.transfer_id,
            account_id = transfer.account_id,
            asset_id = %transfer.asset_id,
            amount = %transfer.amount,
            reason,
            "Withdrawal failed"
        );

        // Kept as FAILED in memory until the write succeeds, never resubmitted.
        self.pending.insert(transfer.id, transfer.clone());
        self.complete_failure(transfer, scope).await
    }

    /// Persist a FAILED record, evict it and notify the back office.
    async fn complete_failure(
        &self,
        transfer: Transfer,
        scope: &CancellationScope,
    ) -> Result<(), TransferError> {
        let mut update = TransferUpdate::status(TransferStatus::Failed);
        if let Some(text) = &transfer.error_text {
            update = update.with_error_text(text.clone());
        }
        self.store.update_transfer(transfer.id, update).await?;
        self.pending.remove(&transfer.id);

        self.notify_failure(&transfer, scope).await;
        Ok(())
    }

    /// Hand the failed withdrawal to the back office, retrying until it is
    /// accepted or `scope` is cancelled during a retry pause.
    async fn notify_failure(&self, transfer: &Transfer, scope: &CancellationScope) {
        let notification =
            TransferNotification::for_transfer(transfer, self.config.confirmations_required);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.invoke_callback(&notification).await {
                Ok(result) => {
                    info!(
                        transfer_id = %notification.transfer_id,
                        reference = ?result.reference,
                        attempt,
                        "Back office accepted failed withdrawal"
                    );
                    return;
                }
                Err(e) => {
                    error!(
                        transfer_id = %notification.transfer_id,
                        attempt,
                        error = %e,
                        "Failed withdrawal notification was not accepted"
                    );
                }
            }

            if scope.wait(self.config.callback_retry_interval()).await {
                error!(
                    transfer_id = %notification.transfer_id,
                    attempts = attempt,
                    "Cancelled before the back office accepted the failed withdrawal"
                );
                return;
            }
        }
    }

    async fn invoke_callback(
        &self,
        notification: &TransferNotification,
    ) -> anyhow::Result<TransferResult> {
        let callback = self.callback.get().ok_or(TransferError::CallbackNotSet)?;
        match callback.on_transfer_failed(notification).await? {
            Some(TransferResult {
                error: Some(error), ..
            }) => anyhow::bail!("back office reported an error: {error}"),
            Some(result) => Ok(result),
            None => anyhow::bail!("back office returned no result"),
        }
    }
}

#[async_trait]
impl Worker for TransfersSender {
    async fn on_init(&self) -> Result<(), WorkerError> {
        self.load_pending().await?;
        Ok(())
    }

    async fn run(&self, scope: CancellationScope) -> Result<(), WorkerError> {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            pending = self.pending.len(),
            "Withdrawal sender started"
        );

        loop {
            let finished = self.process_pending(&scope).await;
            if finished > 0 {
                debug!(finished, pending = self.pending.len(), "Processing cycle done");
            }
            if scope.wait(self.config.poll_interval()).await {
                break;
            }
        }

        info!(pending = self.pending.len(), "Withdrawal sender stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::adapters::mock::{FlakyStore, MockCallback, MockSubmitter};
    use crate::transfer::adapters::{InMemoryDepositAddressProvider, InMemoryTransferStore};
    use crate::transfer::error::SubmitError;
    use crate::worker::CancellationSource;
    use rust_decimal::Decimal;

    fn fast_config() -> SenderConfig {
        SenderConfig {
            poll_interval_ms: 10,
            callback_retry_interval_ms: 10,
            confirmations_required: 3,
            submit: SubmitOptions::default(),
        }
    }

    fn request(key: &str) -> WithdrawalRequest {
        WithdrawalRequest::new(
            key,
            42,
            "ETH",
            "0xAA00000000000000000000000000000000000001",
            Decimal::new(125, 2),
        )
    }

    struct Fixture {
        store: Arc<InMemoryTransferStore>,
        submitter: Arc<MockSubmitter>,
        callback: Arc<MockCallback>,
        provider: Arc<InMemoryDepositAddressProvider>,
        sender: Arc<TransfersSender>,
    }

    fn fixture_with(callback: MockCallback) -> Fixture {
        let store = Arc::new(InMemoryTransferStore::new());
        let submitter = Arc::new(MockSubmitter::new());
        let callback = Arc::new(callback);
        let provider = Arc::new(InMemoryDepositAddressProvider::new());
        let sender = Arc::new(
            TransfersSender::new(
                fast_config(),
                store.clone(),
                submitter.clone(),
                provider.clone(),
            )
            .with_callback(callback.clone()),
        );
        Fixture {
            store,
            submitter,
            callback,
            provider,
            sender,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockCallback::new())
    }

    #[test]
    fn test_default_config() {
        let config = SenderConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.callback_retry_interval(), Duration::from_secs(3));
        assert_eq!(config.confirmations_required, 12);
    }

    #[tokio::test]
    async fn test_enqueue_and_send() {
        let f = fixture();
        let id = f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();
        assert!(f.sender.is_pending(id));

        let source = CancellationSource::new();
        assert_eq!(f.sender.process_pending(&source.scope()).await, 1);

        let stored = f.store.get(id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::SentWithdrawal);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xhash-wd-1"));
        assert_eq!(
            f.store.status_history(id).await,
            vec![
                TransferStatus::New,
                TransferStatus::SendingWithdrawal,
                TransferStatus::SentWithdrawal
            ]
        );
        assert_eq!(f.sender.pending_count(), 0);
        assert_eq!(f.callback.calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue_is_rejected() {
        let f = fixture();
        f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let err = f
            .sender
            .enqueue_withdrawal(request("wd-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::DuplicateRequest(ref key) if key == "wd-1"));
        assert!(err.is_duplicate());
        assert_eq!(f.sender.pending_count(), 1);
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_submission_notifies_back_office() {
        let f = fixture();
        f.submitter
            .push_outcome(Err(SubmitError::Rejected("insufficient funds".into())));
        let id = f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        let stored = f.store.get(id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert!(
            stored
                .error_text
                .as_deref()
                .unwrap()
                .contains("insufficient funds")
        );
        assert!(!f.sender.is_pending(id));

        let received = f.callback.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].transfer_id, "wd-1");
        assert_eq!(received[0].account_id, 42);
        assert_eq!(received[0].amount, Decimal::new(125, 2));
        assert_eq!(received[0].confirmations_required, 3);
        assert_eq!(received[0].status, TransferStatus::Failed);
    }

    #[tokio::test]
    async fn test_blank_hash_counts_as_failure() {
        let f = fixture();
        f.submitter.push_outcome(Ok("  ".into()));
        let id = f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        assert_eq!(f.store.get(id).await.unwrap().status, TransferStatus::Failed);
        assert_eq!(f.callback.calls(), 1);
    }

    #[tokio::test]
    async fn test_notification_retried_until_accepted() {
        let f = fixture_with(MockCallback::new().fail_times(2));
        f.submitter.push_outcome(Err(SubmitError::Network("timeout".into())));
        f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        assert_eq!(f.callback.calls(), 3);
    }

    #[tokio::test]
    async fn test_embedded_error_is_retried() {
        let f = fixture_with(MockCallback::new().fail_times(1).with_embedded_error());
        f.submitter.push_outcome(Err(SubmitError::Network("timeout".into())));
        f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        assert_eq!(f.callback.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_callback_abandoned_on_cancel() {
        let store = Arc::new(InMemoryTransferStore::new());
        let submitter = Arc::new(MockSubmitter::new());
        submitter.push_outcome(Err(SubmitError::Network("timeout".into())));
        let sender = Arc::new(TransfersSender::new(
            fast_config(),
            store.clone(),
            submitter,
            Arc::new(InMemoryDepositAddressProvider::new()),
        ));
        let id = sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        let scope = source.scope();
        let task = {
            let sender = sender.clone();
            tokio::spawn(async move { sender.process_pending(&scope).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(finished, 1);
        assert_eq!(store.get(id).await.unwrap().status, TransferStatus::Failed);
        assert!(!sender.is_pending(id));
    }

    #[tokio::test]
    async fn test_callback_can_only_be_set_once() {
        let f = fixture();
        let err = f
            .sender
            .set_transfer_callback(Arc::new(MockCallback::new()))
            .unwrap_err();
        assert!(matches!(err, TransferError::CallbackAlreadySet));
    }

    #[tokio::test]
    async fn test_init_loads_unfinished_and_initializes_provider() {
        let f = fixture();
        let new_id = f.store.seed(Transfer::new_withdrawal(&request("a"))).await;

        let mut sending = Transfer::new_withdrawal(&request("b"));
        sending.status = TransferStatus::SendingWithdrawal;
        let sending_id = f.store.seed(sending).await;

        let mut sent = Transfer::new_withdrawal(&request("c"));
        sent.status = TransferStatus::SentWithdrawal;
        f.store.seed(sent).await;

        f.sender.on_init().await.unwrap();

        assert_eq!(f.sender.pending_ids(), vec![new_id, sending_id]);
        assert!(f.provider.is_initialized());
        assert_eq!(f.provider.init_count(), 1);

        // Loading again keeps the set as is and skips the provider.
        f.sender.on_init().await.unwrap();
        assert_eq!(f.sender.pending_count(), 2);
        assert_eq!(f.provider.init_count(), 1);
    }

    /// Store that returns records regardless of the requested statuses.
    struct UnfilteredStore(InMemoryTransferStore);

    #[async_trait]
    impl TransferStore for UnfilteredStore {
        async fn list_transfers(
            &self,
            kind: TransferKind,
            _statuses: &[TransferStatus],
        ) -> Result<Vec<Transfer>, TransferError> {
            self.0.list_transfers(kind, &TransferStatus::ALL).await
        }

        async fn insert_if_absent(
            &self,
            transfer: &Transfer,
        ) -> Result<Option<TransferDbId>, TransferError> {
            self.0.insert_if_absent(transfer).await
        }

        async fn update_transfer(
            &self,
            id: TransferDbId,
            update: TransferUpdate,
        ) -> Result<(), TransferError> {
            self.0.update_transfer(id, update).await
        }
    }

    #[tokio::test]
    async fn test_init_rejects_terminal_record() {
        let inner = InMemoryTransferStore::new();
        inner.seed(Transfer::new_withdrawal(&request("ok"))).await;
        let mut failed = Transfer::new_withdrawal(&request("broken"));
        failed.status = TransferStatus::Failed;
        inner.seed(failed).await;

        let provider = Arc::new(InMemoryDepositAddressProvider::new());
        let sender = TransfersSender::new(
            fast_config(),
            Arc::new(UnfilteredStore(inner)),
            Arc::new(MockSubmitter::new()),
            provider.clone(),
        );

        let err = sender.on_init().await.unwrap_err();
        let WorkerError::Other(inner) = err else {
            panic!("expected WorkerError::Other");
        };
        assert!(matches!(
            inner.downcast_ref::<TransferError>(),
            Some(TransferError::CorruptedTransfer { transfer_id, status: TransferStatus::Failed })
                if transfer_id == "broken"
        ));
        assert_eq!(sender.pending_count(), 0);
        assert!(!provider.is_initialized());
    }

    #[tokio::test]
    async fn test_checkpoint_with_hash_is_not_resubmitted() {
        let f = fixture();
        let mut crashed = Transfer::new_withdrawal(&request("wd-1"));
        crashed.status = TransferStatus::SendingWithdrawal;
        crashed.tx_hash = Some("0xbeef".into());
        let id = f.store.seed(crashed).await;

        f.sender.on_init().await.unwrap();
        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        let stored = f.store.get(id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::SentWithdrawal);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xbeef"));
        assert_eq!(f.submitter.submit_count(), 0);
        assert_eq!(f.sender.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_new_record_with_hash_is_dropped() {
        let f = fixture();
        let mut odd = Transfer::new_withdrawal(&request("wd-1"));
        odd.tx_hash = Some("0xbeef".into());
        let id = f.store.seed(odd).await;

        f.sender.on_init().await.unwrap();
        let source = CancellationSource::new();
        assert_eq!(f.sender.process_pending(&source.scope()).await, 1);

        assert_eq!(f.submitter.submit_count(), 0);
        assert!(!f.sender.is_pending(id));
        assert_eq!(f.store.get(id).await.unwrap().status, TransferStatus::New);
    }

    #[tokio::test]
    async fn test_checkpoint_without_hash_is_attempted_again() {
        let f = fixture();
        let mut crashed = Transfer::new_withdrawal(&request("wd-1"));
        crashed.status = TransferStatus::SendingWithdrawal;
        let id = f.store.seed(crashed).await;

        f.sender.on_init().await.unwrap();
        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        assert_eq!(f.submitter.submit_count(), 1);
        assert_eq!(
            f.store.get(id).await.unwrap().status,
            TransferStatus::SentWithdrawal
        );
    }

    #[tokio::test]
    async fn test_cancelled_submission_stays_checkpointed() {
        let f = fixture();
        f.submitter.set_delay(Duration::from_secs(60));
        let id = f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        let scope = source.scope();
        let task = {
            let sender = f.sender.clone();
            tokio::spawn(async move { sender.process_pending(&scope).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        source.cancel();
        let finished = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(finished, 0);
        assert!(f.sender.is_pending(id));
        assert_eq!(
            f.store.get(id).await.unwrap().status,
            TransferStatus::SendingWithdrawal
        );
        assert_eq!(f.callback.calls(), 0);
    }

    #[tokio::test]
    async fn test_cycle_skips_everything_when_cancelled() {
        let f = fixture();
        f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        source.cancel();
        assert_eq!(f.sender.process_pending(&source.scope()).await, 0);
        assert_eq!(f.submitter.submit_count(), 0);
        assert_eq!(f.sender.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_sent_write_resolves_without_resubmission() {
        let store = Arc::new(FlakyStore::new(InMemoryTransferStore::new()));
        let submitter = Arc::new(MockSubmitter::new());
        let sender = TransfersSender::new(
            fast_config(),
            store.clone(),
            submitter.clone(),
            Arc::new(InMemoryDepositAddressProvider::new()),
        );
        let id = sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        store.fail_writes_of(Some(TransferStatus::SentWithdrawal));
        let source = CancellationSource::new();
        assert_eq!(sender.process_pending(&source.scope()).await, 0);

        let in_memory = sender.pending_transfer(id).unwrap();
        assert_eq!(in_memory.tx_hash.as_deref(), Some("0xhash-wd-1"));
        assert_eq!(
            store.inner().get(id).await.unwrap().status,
            TransferStatus::SendingWithdrawal
        );

        store.fail_writes_of(None);
        assert_eq!(sender.process_pending(&source.scope()).await, 1);
        assert_eq!(submitter.submit_count(), 1);
        let stored = store.inner().get(id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::SentWithdrawal);
        assert_eq!(stored.tx_hash.as_deref(), Some("0xhash-wd-1"));
    }

    #[tokio::test]
    async fn test_failed_checkpoint_write_keeps_record_queued() {
        let store = Arc::new(FlakyStore::new(InMemoryTransferStore::new()));
        let submitter = Arc::new(MockSubmitter::new());
        let sender = TransfersSender::new(
            fast_config(),
            store.clone(),
            submitter.clone(),
            Arc::new(InMemoryDepositAddressProvider::new()),
        );
        let id = sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        store.fail_writes_of(Some(TransferStatus::SendingWithdrawal));
        let source = CancellationSource::new();
        sender.process_pending(&source.scope()).await;

        assert_eq!(submitter.submit_count(), 0);
        assert!(sender.is_pending(id));
    }

    #[tokio::test]
    async fn test_none_answer_is_retried() {
        let f = fixture_with(MockCallback::new().answer_none_times(2));
        f.submitter.push_outcome(Err(SubmitError::Network("timeout".into())));
        f.sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        let source = CancellationSource::new();
        f.sender.process_pending(&source.scope()).await;

        assert_eq!(f.callback.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_write_of_failure_is_retried_without_resubmission() {
        let store = Arc::new(FlakyStore::new(InMemoryTransferStore::new()));
        let submitter = Arc::new(MockSubmitter::new());
        submitter.push_outcome(Err(SubmitError::Rejected("insufficient funds".into())));
        let callback = Arc::new(MockCallback::new());
        let sender = TransfersSender::new(
            fast_config(),
            store.clone(),
            submitter.clone(),
            Arc::new(InMemoryDepositAddressProvider::new()),
        )
        .with_callback(callback.clone());
        let id = sender.enqueue_withdrawal(request("wd-1")).await.unwrap();

        store.fail_writes_of(Some(TransferStatus::Failed));
        let source = CancellationSource::new();
        assert_eq!(sender.process_pending(&source.scope()).await, 0);

        let in_memory = sender.pending_transfer(id).unwrap();
        assert_eq!(in_memory.status, TransferStatus::Failed);
        assert_eq!(
            store.inner().get(id).await.unwrap().status,
            TransferStatus::SendingWithdrawal
        );
        assert_eq!(callback.calls(), 0);

        store.fail_writes_of(None);
        assert_eq!(sender.process_pending(&source.scope()).await, 1);

        let stored = store.inner().get(id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(
            stored
                .error_text
                .as_deref()
                .unwrap()
                .matches("insufficient funds")
                .count(),
            1
        );
        assert!(!sender.is_pending(id));
        assert_eq!(submitter.submit_count(), 1);
        assert_eq!(callback.calls(), 1);
    }
}
