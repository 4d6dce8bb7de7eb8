// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use async_trait::async_trait;

use super::{Next, Worker, WorkerId};
use crate::record::AggregationRecord;

/// Folds records sharing an id while a queue batch is being drained and
/// forwards one merged record per id when the batch ends.
pub struct AggregationWorker<T> {
    id: WorkerId,
    name: String,
    pending: HashMap<String, T>,
}

impl<T: AggregationRecord> AggregationWorker<T> {
    #[must_use]
    pub fn new(id: WorkerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            pending: HashMap::new(),
        }
    }
}

#[async_trait]
impl<T: AggregationRecord> Worker<T> for AggregationWorker<T> {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn on_work(&mut self, record: T, _next: &Next<T>) {
        match self.pending.get_mut(record.id()) {
            Some(existing) => existing.merge(&record),
            None => {
                self.pending.insert(record.id().to_string(), record);
            }
        }
    }

    async fn on_batch_end(&mut self, next: &Next<T>) {
        for (_, record) in self.pending.drain() {
            next.forward(record);
        }
    }
}
