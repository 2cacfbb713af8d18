//! Transfer Sender - Supervised Withdrawal Processing
//!
//! A crash-safe withdrawal sender running inside a small supervision tree.
//!
//! # Modules
//!
//! - [`worker`] - Worker lifecycle, supervision tree and cooperative cancellation
//! - [`transfer`] - Withdrawal state machine, gateways and the sender worker
//! - [`config`] - YAML application configuration
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod logging;
pub mod transfer;
pub mod worker;

// Convenient re-exports at crate root
pub use transfer::{
    SenderConfig, Transfer, TransferCallback, TransferError, TransferStatus, TransfersSender,
    WithdrawalRequest,
};
pub use worker::{
    BackgroundWorker, CancellationScope, CancellationSource, Worker, WorkerError, WorkerNode,
    WorkerState,
};
