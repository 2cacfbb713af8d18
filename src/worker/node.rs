//! Worker Node
//!
//! A node in the supervision tree. Owns one run loop (a [`Worker`]), its child
//! nodes and the cancellation source bound to the current run.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Initializing → Initialized → Running → StopSignalled → Stopped
//!                                           ↑                          │
//!                                           └────────── start ─────────┘
//! ```
//!
//! - `init` runs the node's own setup and every child's setup concurrently.
//! - `start` launches the own loop first, then starts children.
//! - `stop` only signals; `wait_for_completion` blocks until all loops exited.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};

use super::background::BackgroundWorker;
use super::error::WorkerError;
use super::scope::{CancellationScope, CancellationSource};

/// Capability interface of a supervised worker.
///
/// Only `run` is mandatory. `run` is invoked once per `WorkerNode::start` and
/// must observe the scope at its own suspension points.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// One-time setup, called from `WorkerNode::init`.
    async fn on_init(&self) -> Result<(), WorkerError> {
        Ok(())
    }

    /// Called right before the run loop is spawned.
    fn on_start(&self) {}

    /// Called right after cancellation was signalled.
    fn on_stop(&self) {}

    async fn run(&self, scope: CancellationScope) -> Result<(), WorkerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Initializing,
    Initialized,
    Running,
    StopSignalled,
    Stopped,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Created => "CREATED",
            WorkerState::Initializing => "INITIALIZING",
            WorkerState::Initialized => "INITIALIZED",
            WorkerState::Running => "RUNNING",
            WorkerState::StopSignalled => "STOP_SIGNALLED",
            WorkerState::Stopped => "STOPPED",
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub struct WorkerNode {
    name: String,
    worker: Arc<dyn Worker>,
    sub_workers: Vec<WorkerNode>,
    state: WorkerState,
    source: Option<CancellationSource>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerNode {
    pub fn new(name: impl Into<String>, worker: Arc<dyn Worker>) -> Self {
        Self {
            name: name.into(),
            worker,
            sub_workers: Vec::new(),
            state: WorkerState::Created,
            source: None,
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.state, WorkerState::Created | WorkerState::Initializing)
    }

    pub fn sub_workers(&self) -> &[WorkerNode] {
        &self.sub_workers
    }

    /// Scope of the current (or last) run, `None` if never started.
    pub fn scope(&self) -> Option<CancellationScope> {
        self.source.as_ref().map(CancellationSource::scope)
    }

    /// Attach a callback-driven leaf worker named `"{parent}.{name}"`.
    ///
    /// The tree must be composed before it is started.
    pub fn add_sub_worker<F, Fut>(&mut self, name: &str, work: F) -> Result<(), WorkerError>
    where
        F: Fn(CancellationScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        let node = WorkerNode::new(
            format!("{}.{}", self.name, name),
            Arc::new(BackgroundWorker::new(work)),
        );
        self.add_worker(node)
    }

    /// Attach an arbitrary child node.
    pub fn add_worker(&mut self, node: WorkerNode) -> Result<(), WorkerError> {
        if self.state == WorkerState::Running {
            return Err(WorkerError::TreeRunning(self.name.clone()));
        }
        self.sub_workers.push(node);
        Ok(())
    }

    /// Initialize this node and all children. May succeed only once.
    ///
    /// Children that initialized during an earlier, failed attempt are not
    /// initialized again.
    pub fn init(&mut self) -> BoxFuture<'_, Result<(), WorkerError>> {
        async move {
            if self.is_initialized() {
                return Err(WorkerError::AlreadyInitialized(self.name.clone()));
            }

            info!(worker = %self.name, "Initializing..");
            self.state = WorkerState::Initializing;

            let (own, children) = future::join(
                self.worker.on_init(),
                future::join_all(
                    self.sub_workers
                        .iter_mut()
                        .filter(|child| !child.is_initialized())
                        .map(|child| child.init()),
                ),
            )
            .await;

            if let Err(e) = children.into_iter().fold(own, |acc, r| acc.and(r)) {
                error!(worker = %self.name, error = %e, "Initialization failed");
                self.state = WorkerState::Created;
                return Err(e);
            }

            self.state = WorkerState::Initialized;
            info!(worker = %self.name, "Initialized.");
            Ok(())
        }
        .boxed()
    }

    /// Launch the own loop, then every child. Initializes first if needed.
    ///
    /// On a restart the loop of the previous run is awaited first, so two
    /// loops of the same worker never overlap. Returns as soon as the new
    /// loops are spawned. If a child fails to start, everything started by
    /// this call is stopped again before the error is returned.
    pub fn start(&mut self) -> BoxFuture<'_, Result<(), WorkerError>> {
        async move {
            if self.state == WorkerState::Running {
                return Err(WorkerError::AlreadyRunning(self.name.clone()));
            }

            if !self.is_initialized() {
                self.init().await?;
            }

            if self.source.is_some() {
                info!(worker = %self.name, "Restarting..");
            } else {
                info!(worker = %self.name, "Starting..");
            }

            if let Some(previous) = self.handle.take() {
                if !previous.is_finished() {
                    warn!(worker = %self.name, "Previous run loop has not exited yet, waiting for it");
                }
                join_loop(self.name.clone(), Some(previous)).await;
            }

            let source = CancellationSource::new();
            let scope = source.scope();
            self.source = Some(source);

            self.worker.on_start();

            let span = info_span!("worker", name = %self.name);
            let worker = Arc::clone(&self.worker);
            self.handle = Some(tokio::spawn(run_guarded(worker, scope).instrument(span)));
            self.state = WorkerState::Running;

            for started in 0..self.sub_workers.len() {
                let result = self.sub_workers[started].start().await;
                if let Err(e) = result {
                    error!(
                        worker = %self.name,
                        child = %self.sub_workers[started].name,
                        error = %e,
                        "Sub-worker failed to start, stopping what was started"
                    );
                    self.abandon_start(started).await;
                    return Err(e);
                }
            }

            info!(worker = %self.name, "Started.");
            Ok(())
        }
        .boxed()
    }

    /// Undo a partial `start`: stop the own loop and the first `started`
    /// children, then wait for them.
    async fn abandon_start(&mut self, started: usize) {
        if let Some(source) = self.source.as_ref() {
            source.cancel();
        }
        self.worker.on_stop();
        self.state = WorkerState::StopSignalled;

        for child in &mut self.sub_workers[..started] {
            if let Err(e) = child.stop() {
                warn!(worker = %child.name, error = %e, "Failed to stop sub-worker");
            }
        }

        join_loop(self.name.clone(), self.handle.take()).await;
        future::join_all(
            self.sub_workers[..started]
                .iter_mut()
                .map(|c| c.wait_for_completion()),
        )
        .await;
        self.state = WorkerState::Stopped;
    }

    /// Signal cancellation to this node and, recursively, to its children.
    ///
    /// Does not wait for the loops to exit.
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        let Some(source) = self.source.as_ref() else {
            return Err(WorkerError::NotStarted(self.name.clone()));
        };

        info!(worker = %self.name, "Signalling to stop..");
        source.cancel();

        self.worker.on_stop();
        if self.state == WorkerState::Running {
            self.state = WorkerState::StopSignalled;
        }

        for child in &mut self.sub_workers {
            child.stop()?;
        }

        info!(worker = %self.name, "Processed signal to stop.");
        Ok(())
    }

    /// Wait until the own loop and every child's loop have exited.
    ///
    /// Loop failures are logged per task and never re-raised.
    pub fn wait_for_completion(&mut self) -> BoxFuture<'_, ()> {
        async move {
            info!(worker = %self.name, "Waiting for worker to stop..");

            let own = join_loop(self.name.clone(), self.handle.take());
            let children =
                future::join_all(self.sub_workers.iter_mut().map(|c| c.wait_for_completion()));
            future::join(own, children).await;

            if matches!(
                self.state,
                WorkerState::Running | WorkerState::StopSignalled
            ) {
                self.state = WorkerState::Stopped;
            }
            info!(worker = %self.name, "Stopped. Really.");
        }
        .boxed()
    }

    /// Release the cancellation source and loop handle, then dispose children.
    ///
    /// Dropping the source reads as cancellation to any loop still running.
    pub fn dispose(&mut self) {
        self.source = None;
        self.handle = None;
        for child in &mut self.sub_workers {
            child.dispose();
        }
    }
}

async fn join_loop(name: String, handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else {
        return;
    };
    match handle.await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            info!(worker = %name, "Run loop task was cancelled");
        }
        Err(e) => {
            error!(worker = %name, error = %e, "Run loop task failed");
        }
    }
}

async fn run_guarded(worker: Arc<dyn Worker>, scope: CancellationScope) {
    if scope.is_cancelled() {
        info!("Run loop was cancelled before it got started");
        return;
    }

    match worker.run(scope).await {
        Ok(()) => {}
        Err(WorkerError::Cancelled) => info!("Run loop terminated by cancellation"),
        Err(e) => error!(error = %e, "Run loop failed and terminated"),
    }

    info!("Run loop exited");
}
