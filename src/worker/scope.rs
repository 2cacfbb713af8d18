//! Cancellation Scope
//!
//! Cooperative stop signal shared between a worker node and the loop it runs.
//! Backed by a `tokio::sync::watch` channel: the node keeps the
//! [`CancellationSource`], loops receive cheap [`CancellationScope`] clones.

use std::time::Duration;

use tokio::sync::watch;

use super::error::WorkerError;

/// Owning side of a cancellation scope. Held by the worker node.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

impl CancellationSource {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a scope observing this source.
    pub fn scope(&self) -> CancellationScope {
        CancellationScope {
            rx: self.tx.subscribe(),
        }
    }

    /// Signal cancellation. Idempotent; works with no live scopes.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a cancellation scope, passed into worker loops.
///
/// A scope whose source has been dropped counts as cancelled.
#[derive(Debug, Clone)]
pub struct CancellationScope {
    rx: watch::Receiver<bool>,
}

impl CancellationScope {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Return `Err(WorkerError::Cancelled)` if the scope is cancelled.
    pub fn check(&self) -> Result<(), WorkerError> {
        if self.is_cancelled() {
            Err(WorkerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is signalled (or the source is dropped).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means the source is gone, which we treat as cancellation.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Sleep for `interval` unless cancelled first.
    ///
    /// Returns `true` if the scope is cancelled when the wait ends.
    pub async fn wait(&self, interval: Duration) -> bool {
        tokio::select! {
            _ = self.cancelled() => true,
            _ = tokio::time::sleep(interval) => self.is_cancelled(),
        }
    }
}
