// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{PipelineError, StorageError};
use crate::record::AggregationRecord;

/// One prepared write against a table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOperation<T> {
    Insert(Vec<T>),
    Update(Vec<T>),
}

impl<T> BatchOperation<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            BatchOperation::Insert(records) | BatchOperation::Update(records) => records.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Storage of one record kind at one granularity.
#[async_trait]
pub trait PersistenceDao<T: AggregationRecord>: Send + Sync {
    /// Previously stored value of `id`, if any.
    async fn get(&self, id: &str) -> Result<Option<T>, StorageError>;

    fn prepare_batch_insert(&self, records: Vec<T>) -> BatchOperation<T> {
        BatchOperation::Insert(records)
    }

    fn prepare_batch_update(&self, records: Vec<T>) -> BatchOperation<T> {
        BatchOperation::Update(records)
    }

    /// Applies prepared operations as one batch.
    async fn submit(&self, batch: Vec<BatchOperation<T>>) -> Result<(), StorageError>;
}

/// Resolves the DAO bound to a table name.
pub trait StorageProvider {
    fn dao<T: AggregationRecord>(
        &self,
        table: &str,
    ) -> Result<Arc<dyn PersistenceDao<T>>, PipelineError>;
}

/// Table kept in process memory.
#[derive(Debug)]
pub struct InMemoryDao<T> {
    table: String,
    rows: Mutex<HashMap<String, T>>,
    submissions: AtomicUsize,
}

impl<T: AggregationRecord> InMemoryDao<T> {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn row(&self, id: &str) -> Option<T> {
        #[allow(clippy::expect_used)]
        let rows = self.rows.lock().expect("lock poisoned");
        rows.get(id).cloned()
    }

    /// Every stored row, sorted by id.
    #[must_use]
    pub fn rows(&self) -> Vec<T> {
        #[allow(clippy::expect_used)]
        let rows = self.rows.lock().expect("lock poisoned");
        let mut rows: Vec<T> = rows.values().cloned().collect();
        rows.sort_by(|a, b| a.id().cmp(b.id()));
        rows
    }

    pub fn put(&self, record: T) {
        #[allow(clippy::expect_used)]
        let mut rows = self.rows.lock().expect("lock poisoned");
        rows.insert(record.id().to_string(), record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let rows = self.rows.lock().expect("lock poisoned");
        rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of batches submitted so far.
    #[must_use]
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl<T: AggregationRecord> PersistenceDao<T> for InMemoryDao<T> {
    async fn get(&self, id: &str) -> Result<Option<T>, StorageError> {
        Ok(self.row(id))
    }

    async fn submit(&self, batch: Vec<BatchOperation<T>>) -> Result<(), StorageError> {
        #[allow(clippy::expect_used)]
        let mut rows = self.rows.lock().expect("lock poisoned");
        for operation in batch {
            let (BatchOperation::Insert(records) | BatchOperation::Update(records)) = operation;
            for record in records {
                rows.insert(record.id().to_string(), record);
            }
        }
        self.submissions.fetch_add(1, Ordering::Relaxed);
        debug!("{} now holds {} rows", self.table, rows.len());
        Ok(())
    }
}

/// Hands out an [`InMemoryDao`] per table, creating it on first use.
#[derive(Default)]
pub struct InMemoryStorage {
    tables: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    allowed: Option<HashSet<String>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that only binds the given tables. Asking for any other table
    /// fails with [`PipelineError::MissingDao`].
    #[must_use]
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: Mutex::default(),
            allowed: Some(tables.into_iter().map(Into::into).collect()),
        }
    }

    /// The DAO of `table` if it has been created with record type `T`.
    #[must_use]
    pub fn table<T: AggregationRecord>(&self, table: &str) -> Option<Arc<InMemoryDao<T>>> {
        #[allow(clippy::expect_used)]
        let tables = self.tables.lock().expect("lock poisoned");
        tables
            .get(table)
            .cloned()
            .and_then(|dao| dao.downcast::<InMemoryDao<T>>().ok())
    }
}

impl StorageProvider for InMemoryStorage {
    fn dao<T: AggregationRecord>(
        &self,
        table: &str,
    ) -> Result<Arc<dyn PersistenceDao<T>>, PipelineError> {
        if let Some(allowed) = &self.allowed {
            if !allowed.contains(table) {
                return Err(PipelineError::MissingDao(table.to_string()));
            }
        }
        #[allow(clippy::expect_used)]
        let mut tables = self.tables.lock().expect("lock poisoned");
        let dao = tables
            .entry(table.to_string())
            .or_insert_with(|| -> Arc<dyn Any + Send + Sync> {
                Arc::new(InMemoryDao::<T>::new(table))
            })
            .clone();
        let dao = dao
            .downcast::<InMemoryDao<T>>()
            .map_err(|_| PipelineError::TableTypeMismatch(table.to_string()))?;
        Ok(dao as Arc<dyn PersistenceDao<T>>)
    }
}
