// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Workers used by unit tests to observe what flows through a graph.

#![cfg(test)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{Next, Worker, WorkerId};

/// Shared sink filled by [`CollectingWorker`].
pub(crate) struct Collected<T>(Arc<Mutex<Vec<T>>>);

impl<T> Default for Collected<T> {
    fn default() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }
}

impl<T> Clone for Collected<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Clone> Collected<T> {
    pub(crate) fn records(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }
}

pub(crate) struct CollectingWorker<T> {
    id: WorkerId,
    sink: Collected<T>,
}

impl<T> CollectingWorker<T> {
    pub(crate) fn new(id: WorkerId, sink: Collected<T>) -> Self {
        Self { id, sink }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Worker<T> for CollectingWorker<T> {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        "collecting"
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        self.sink.0.lock().unwrap().push(record.clone());
        next.forward(record);
    }
}

pub(crate) struct PassThroughWorker {
    id: WorkerId,
}

impl PassThroughWorker {
    pub(crate) fn new(id: WorkerId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Worker<T> for PassThroughWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        "pass-through"
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        next.forward(record);
    }
}
