// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::PersistenceDao;
use crate::errors::StorageError;
use crate::graph::{Next, Worker, WorkerId};
use crate::record::AggregationRecord;

/// Outcome of one [`Flushable::flush_and_switch`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub inserted: usize,
    pub updated: usize,
    /// Records put back in the buffer because their stored value could not
    /// be read.
    pub deferred: usize,
}

impl FlushReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deferred == 0
    }
}

/// A persistence buffer as seen by the flush timer.
#[async_trait]
pub trait Flushable: Send + Sync {
    fn name(&self) -> &str;

    async fn flush_and_switch(&self) -> Result<FlushReport, StorageError>;
}

struct PersistenceBuffer<T> {
    name: String,
    need_merge_db_data: bool,
    dao: Arc<dyn PersistenceDao<T>>,
    buffer: Mutex<HashMap<String, T>>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl<T: AggregationRecord> PersistenceBuffer<T> {
    fn merge_into(buffer: &mut HashMap<String, T>, record: T) {
        match buffer.get_mut(record.id()) {
            Some(existing) => existing.merge(&record),
            None => {
                buffer.insert(record.id().to_string(), record);
            }
        }
    }

    fn buffer(&self, record: T) {
        #[allow(clippy::expect_used)]
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        Self::merge_into(&mut buffer, record);
    }

    fn switch(&self) -> HashMap<String, T> {
        #[allow(clippy::expect_used)]
        let mut buffer = self.buffer.lock().expect("lock poisoned");
        std::mem::take(&mut *buffer)
    }

    fn pending(&self) -> usize {
        #[allow(clippy::expect_used)]
        let buffer = self.buffer.lock().expect("lock poisoned");
        buffer.len()
    }

    async fn flush(&self) -> Result<FlushReport, StorageError> {
        let _in_flight = self.flush_lock.lock().await;

        let swapped = self.switch();
        if swapped.is_empty() {
            return Ok(FlushReport::default());
        }

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut deferred = Vec::new();
        for (id, mut record) in swapped {
            if !self.need_merge_db_data {
                inserts.push(record);
                continue;
            }
            match self.dao.get(&id).await {
                Ok(Some(stored)) => {
                    record.merge(&stored);
                    updates.push(record);
                }
                Ok(None) => inserts.push(record),
                Err(e) => {
                    warn!("{}: deferring {id} to the next flush: {e}", self.name);
                    deferred.push(record);
                }
            }
        }

        let report = FlushReport {
            inserted: inserts.len(),
            updated: updates.len(),
            deferred: deferred.len(),
        };

        if !deferred.is_empty() {
            #[allow(clippy::expect_used)]
            let mut buffer = self.buffer.lock().expect("lock poisoned");
            for record in deferred {
                Self::merge_into(&mut buffer, record);
            }
        }

        let mut batch = Vec::with_capacity(2);
        if !inserts.is_empty() {
            batch.push(self.dao.prepare_batch_insert(inserts));
        }
        if !updates.is_empty() {
            batch.push(self.dao.prepare_batch_update(updates));
        }
        if !batch.is_empty() {
            self.dao.submit(batch).await?;
        }

        debug!(
            "{}: flushed {} inserts and {} updates",
            self.name, report.inserted, report.updated
        );
        Ok(report)
    }
}

/// Buffers records of one table and granularity until the next flush.
///
/// Records with the same id are merged in the buffer. Each incoming record
/// is also forwarded as-is so the next granularity can fold the same delta.
pub struct PersistenceWorker<T> {
    id: WorkerId,
    inner: Arc<PersistenceBuffer<T>>,
}

impl<T: AggregationRecord> PersistenceWorker<T> {
    #[must_use]
    pub fn new(
        id: WorkerId,
        name: impl Into<String>,
        dao: Arc<dyn PersistenceDao<T>>,
        need_merge_db_data: bool,
    ) -> Self {
        Self {
            id,
            inner: Arc::new(PersistenceBuffer {
                name: name.into(),
                need_merge_db_data,
                dao,
                buffer: Mutex::new(HashMap::new()),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Flush side of this worker, to hand to a
    /// [`PersistenceTimer`](super::PersistenceTimer).
    #[must_use]
    pub fn handle(&self) -> PersistenceHandle<T> {
        PersistenceHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<T: AggregationRecord> Worker<T> for PersistenceWorker<T> {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        if next.is_empty() {
            self.inner.buffer(record);
        } else {
            self.inner.buffer(record.clone());
            next.forward(record);
        }
    }
}

pub struct PersistenceHandle<T> {
    inner: Arc<PersistenceBuffer<T>>,
}

impl<T> Clone for PersistenceHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AggregationRecord> PersistenceHandle<T> {
    /// Number of distinct ids waiting for the next flush.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending()
    }
}

#[async_trait]
impl<T: AggregationRecord> Flushable for PersistenceHandle<T> {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn flush_and_switch(&self) -> Result<FlushReport, StorageError> {
        self.inner.flush().await
    }
}
