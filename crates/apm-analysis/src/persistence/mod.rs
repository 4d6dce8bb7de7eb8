// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffered persistence of aggregation records.
//!
//! Each table and granularity has its own [`PersistenceWorker`]. The worker
//! folds records into an in-memory buffer keyed by id. A
//! [`PersistenceTimer`] periodically swaps that buffer out and writes it
//! through the table's [`PersistenceDao`]. With merge-with-db enabled the
//! stored value of every id is read first, so a row accumulates across
//! flushes instead of being overwritten.

mod dao;
mod timer;
mod worker;

pub use dao::{BatchOperation, InMemoryDao, InMemoryStorage, PersistenceDao, StorageProvider};
pub use timer::PersistenceTimer;
pub use worker::{FlushReport, Flushable, PersistenceHandle, PersistenceWorker};
