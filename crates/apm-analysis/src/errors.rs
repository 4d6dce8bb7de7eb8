// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::graph::{GraphId, WorkerId};

/// Rejection returned when a record cannot be enqueued into a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    #[error("queue of worker {0} is full")]
    QueueFull(WorkerId),
    #[error("worker {0} no longer accepts records")]
    Closed(WorkerId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("no graph {graph_id} registered for record type {record_type}")]
    UnknownGraph {
        graph_id: GraphId,
        record_type: &'static str,
    },
    #[error("graph {graph_id} is already registered for record type {record_type}")]
    DuplicateGraph {
        graph_id: GraphId,
        record_type: &'static str,
    },
    #[error("worker id {worker_id} is used twice in graph {graph_id}")]
    DuplicateWorker {
        graph_id: GraphId,
        worker_id: WorkerId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read {id} from {table}: {reason}")]
    Read {
        table: String,
        id: String,
        reason: String,
    },
    #[error("failed to write batch to {table}: {reason}")]
    Write { table: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("no worker {worker_id} bound for remote delivery in graph {graph_id}")]
    NoTarget {
        graph_id: GraphId,
        worker_id: WorkerId,
    },
    #[error("failed to encode or decode remote record: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("failed to send record to {address}: {reason}")]
    Transport { address: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("malformed span data: {0}")]
    Malformed(String),
}

/// Wiring failures. These surface at startup, never on the hot path.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no persistence DAO bound for table {0}")]
    MissingDao(String),
    #[error("table {0} is bound to a different record type")]
    TableTypeMismatch(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
