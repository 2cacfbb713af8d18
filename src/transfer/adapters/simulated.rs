//! Simulated chain submitter
//!
//! Stands in for a real hot wallet in local runs: waits a configurable
//! latency, then returns a random EVM-looking tx hash.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::TransferSubmitter;
use crate::transfer::error::SubmitError;
use crate::transfer::types::{SubmitOptions, Transfer};
use crate::worker::CancellationScope;

#[derive(Debug, Clone)]
pub struct SimulatedChainSubmitter {
    latency: Duration,
}

impl SimulatedChainSubmitter {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    fn validate_address(address: &str) -> bool {
        address.starts_with("0x") && address.len() == 42
    }
}

impl Default for SimulatedChainSubmitter {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl TransferSubmitter for SimulatedChainSubmitter {
    async fn submit(
        &self,
        transfer: &Transfer,
        scope: &CancellationScope,
        options: SubmitOptions,
    ) -> Result<String, SubmitError> {
        if !Self::validate_address(&transfer.destination_address) {
            return Err(SubmitError::Rejected(format!(
                "invalid destination address {}",
                transfer.destination_address
            )));
        }

        debug!(
            transfer_id = %transfer.transfer_id,
            wait_for_receipt = options.wait_for_receipt,
            "Broadcasting simulated transfer"
        );

        if scope.wait(self.latency).await {
            return Err(SubmitError::Cancelled);
        }

        let tx_id = uuid::Uuid::new_v4();
        Ok(format!("0x{:x}", tx_id.simple()))
    }
}
