//! Crash-safe Withdrawal Sender
//!
//! Persists withdrawals, submits them to the chain and reports failures to the
//! back office. Runs as a [`Worker`](crate::worker::Worker) inside a
//! supervision tree.
//!
//! # State Machine
//!
//! ```text
//! NEW → SENDING_WITHDRAWAL → SENT_WITHDRAWAL
//!              ↓
//!           FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Checkpoint-Before-Submit**: `SENDING_WITHDRAWAL` is persisted before
//!    the submitter is called
//! 2. **No Resubmission**: a checkpointed record with a tx hash is never
//!    submitted again
//! 3. **Idempotency**: a `transfer_id` is accepted once, ever
//! 4. **Cancellation Is Not Failure**: an attempt interrupted by shutdown stays
//!    checkpointed and is resumed on the next start

pub mod adapters;
pub mod error;
pub mod sender;
pub mod state;
pub mod types;


pub use adapters::{
    DepositAddressProvider, InMemoryDepositAddressProvider, InMemoryTransferStore,
    SimulatedChainSubmitter, TransferCallback, TransferStore, TransferSubmitter,
};
pub use error::{SubmitError, TransferError};
pub use sender::{SenderConfig, TransfersSender};
pub use state::{TransferKind, TransferStatus};
pub use types::{
    SubmitOptions, Transfer, TransferDbId, TransferNotification, TransferResult, TransferUpdate,
    WithdrawalRequest,
};
