//! Worker Supervision
//!
//! Hierarchical worker tree with cooperative cancellation.
//!
//! # Contract
//!
//! 1. **Init Once**: a node initializes at most once; `start` initializes on demand
//! 2. **Parent First**: a node's own loop is launched before its children start
//! 3. **Signal Down**: `stop` cancels the node's scope and then every descendant
//! 4. **Contained Failure**: a loop's error or panic is logged, never propagated
//!    to siblings, the parent or the caller of `start`/`stop`

pub mod background;
pub mod error;
pub mod node;
pub mod scope;

pub use background::BackgroundWorker;
pub use error::WorkerError;
pub use node::{Worker, WorkerNode, WorkerState};
pub use scope::{CancellationScope, CancellationSource};
