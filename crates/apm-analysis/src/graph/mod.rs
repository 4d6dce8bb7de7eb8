// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Computation graphs.
//!
//! A graph is a fixed tree of workers through which one record type flows.
//! Every node owns a bounded queue and is driven by exactly one task, so a
//! worker's `on_work` never runs concurrently with itself:
//!
//! ```text
//!  Graph::start ──try_send──> [queue] ─> node task ─> Worker::on_work ─> Next::forward
//!                                                                          │
//!                                                       [queue] <──try_send┘
//! ```
//!
//! Producers never block: a full queue rejects the record with
//! [`WorkerError::QueueFull`] and the caller decides to drop it.

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::errors::WorkerError;

mod aggregation;
mod granularity;
mod registry;
mod stage;
#[cfg(test)]
pub(crate) mod test_support;

pub use aggregation::AggregationWorker;
pub use granularity::GranularityWorker;
pub use registry::GraphRegistry;
pub use stage::{Graph, Stage};

pub type GraphId = u32;
pub type WorkerId = u32;

/// A stateful step of a graph.
#[async_trait]
pub trait Worker<T>: Send + 'static
where
    T: Send + 'static,
{
    /// Unique within the owning graph.
    fn id(&self) -> WorkerId;

    fn name(&self) -> &str;

    async fn on_work(&mut self, record: T, next: &Next<T>);

    /// Called once the node's queue has been drained.
    async fn on_batch_end(&mut self, _next: &Next<T>) {}

    /// Called after the last record has been processed during shutdown.
    async fn on_shutdown(&mut self, _next: &Next<T>) {}
}

/// Enqueue side of a running worker node.
pub struct WorkerRef<T> {
    id: WorkerId,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for WorkerRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> WorkerRef<T> {
    pub(crate) fn new(id: WorkerId, tx: mpsc::Sender<T>) -> Self {
        Self { id, tx }
    }

    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Enqueues without waiting.
    pub fn tell(&self, record: T) -> Result<(), WorkerError> {
        self.tx.try_send(record).map_err(|e| match e {
            TrySendError::Full(_) => WorkerError::QueueFull(self.id),
            TrySendError::Closed(_) => WorkerError::Closed(self.id),
        })
    }
}

/// Downstream nodes of a worker.
pub struct Next<T> {
    refs: Vec<WorkerRef<T>>,
}

impl<T> Clone for Next<T> {
    fn clone(&self) -> Self {
        Self {
            refs: self.refs.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Next<T> {
    pub(crate) fn new(refs: Vec<WorkerRef<T>>) -> Self {
        Self { refs }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Hands `record` to every downstream node. Rejected records are dropped.
    pub fn forward(&self, record: T) {
        if let Some((last, rest)) = self.refs.split_last() {
            for worker in rest {
                deliver(worker, record.clone());
            }
            deliver(last, record);
        }
    }
}

fn deliver<T: Send + 'static>(worker: &WorkerRef<T>, record: T) {
    if let Err(e) = worker.tell(record) {
        warn!("Dropping record: {e}");
    }
}
