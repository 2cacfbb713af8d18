//! Background Worker
//!
//! Leaf worker whose loop is an injected closure. Lets callers graft periodic
//! tasks onto a supervision tree without defining a dedicated type.

use std::future::Future;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};

use super::error::WorkerError;
use super::node::Worker;
use super::scope::CancellationScope;

type WorkFn = dyn Fn(CancellationScope) -> BoxFuture<'static, Result<(), WorkerError>> + Send + Sync;

pub struct BackgroundWorker {
    work: Box<WorkFn>,
}

impl BackgroundWorker {
    pub fn new<F, Fut>(work: F) -> Self
    where
        F: Fn(CancellationScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkerError>> + Send + 'static,
    {
        Self {
            work: Box::new(move |scope| work(scope).boxed()),
        }
    }
}

#[async_trait]
impl Worker for BackgroundWorker {
    async fn run(&self, scope: CancellationScope) -> Result<(), WorkerError> {
        (self.work)(scope).await
    }
}
