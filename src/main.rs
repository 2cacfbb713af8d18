//! Transfer Sender demo
//!
//! Runs the withdrawal sender under a supervision tree with in-memory
//! gateways and a simulated chain:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ TransfersSender │───▶│  Simulated   │    │  Back office │
//! │  (poll loop)    │    │    chain     │    │  (log only)  │
//! └────────┬────────┘    └──────────────┘    └──────────────┘
//!          │
//!   TransfersSender.stats
//! ```
//!
//! Stops on Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{error, info};

use transfer_sender::config::AppConfig;
use transfer_sender::transfer::{
    InMemoryDepositAddressProvider, InMemoryTransferStore, SimulatedChainSubmitter,
    TransferCallback, TransferNotification, TransferResult, TransfersSender, WithdrawalRequest,
};
use transfer_sender::worker::WorkerNode;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Back office stand-in: logs the notification and accepts it.
struct LoggingBackOffice;

#[async_trait]
impl TransferCallback for LoggingBackOffice {
    async fn on_transfer_failed(
        &self,
        notification: &TransferNotification,
    ) -> anyhow::Result<Option<TransferResult>> {
        let payload = serde_json::to_string(notification)?;
        info!(%payload, "Back office received failed withdrawal");
        Ok(Some(TransferResult::accepted(uuid::Uuid::new_v4().to_string())))
    }
}

fn demo_requests() -> Vec<WithdrawalRequest> {
    vec![
        WithdrawalRequest::new(
            "demo-wd-1",
            1001,
            "ETH",
            "0x5A0b54D5dc17e0AadC383d2db43B0a0D3E029c4c",
            Decimal::new(25, 2),
        ),
        WithdrawalRequest::new(
            "demo-wd-2",
            1002,
            "USDT",
            "0x8ba1f109551bD432803012645Ac136ddd64DBA72",
            Decimal::new(1500, 0),
        ),
        // Rejected by the simulated chain, exercises the failure path.
        WithdrawalRequest::new("demo-wd-3", 1003, "ETH", "not-an-address", Decimal::ONE),
    ]
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = transfer_sender::logging::init_logging(&app_config)?;

    info!("Starting transfer sender in {} mode", env);

    let store = Arc::new(InMemoryTransferStore::new());
    let sender = Arc::new(
        TransfersSender::new(
            app_config.sender.clone(),
            store.clone(),
            Arc::new(SimulatedChainSubmitter::new(Duration::from_millis(
                app_config.chain.latency_ms,
            ))),
            Arc::new(InMemoryDepositAddressProvider::new()),
        )
        .with_callback(Arc::new(LoggingBackOffice)),
    );

    let mut root = WorkerNode::new("TransfersSender", sender.clone());
    let stats_sender = sender.clone();
    root.add_sub_worker("stats", move |scope| {
        let sender = stats_sender.clone();
        async move {
            while !scope.wait(Duration::from_secs(10)).await {
                info!(pending = sender.pending_count(), "Sender stats");
            }
            scope.check()
        }
    })?;

    root.start().await?;

    for request in demo_requests() {
        if let Err(e) = sender.enqueue_withdrawal(request).await {
            error!(code = e.code(), error = %e, "Demo withdrawal rejected");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    root.stop()?;
    root.wait_for_completion().await;
    root.dispose();

    info!(
        records = store.len().await,
        pending = sender.pending_count(),
        "Transfer sender stopped"
    );
    Ok(())
}
