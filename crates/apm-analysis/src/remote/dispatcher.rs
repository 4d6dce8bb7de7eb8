// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use tracing::debug;

use super::RemoteMessage;
use crate::errors::RemoteError;
use crate::graph::{Graph, GraphId, WorkerId};
use crate::record::AggregationRecord;

type Deliver = Box<dyn Fn(serde_json::Value) -> Result<(), RemoteError> + Send + Sync>;

/// Routes inbound remote messages into the local graphs.
///
/// Bound once at startup for every remote worker, then shared read-only with
/// the receiver.
#[derive(Default)]
pub struct RemoteDispatcher {
    targets: HashMap<(GraphId, WorkerId), Deliver>,
}

impl RemoteDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes records addressed to `worker_id` of `graph` continue at that
    /// worker's downstream nodes.
    pub fn bind<T: AggregationRecord>(
        &mut self,
        graph: &Graph<T>,
        worker_id: WorkerId,
    ) -> Result<(), RemoteError> {
        let graph_id = graph.id();
        let next = graph.next_of(worker_id).ok_or(RemoteError::NoTarget {
            graph_id,
            worker_id,
        })?;
        self.targets.insert(
            (graph_id, worker_id),
            Box::new(move |payload| {
                let record: T = serde_json::from_value(payload)?;
                next.forward(record);
                Ok(())
            }),
        );
        debug!("Remote delivery bound for worker {worker_id} of graph {graph_id}");
        Ok(())
    }

    pub fn dispatch(&self, message: RemoteMessage) -> Result<(), RemoteError> {
        let RemoteMessage {
            graph_id,
            worker_id,
            payload,
        } = message;
        let deliver = self
            .targets
            .get(&(graph_id, worker_id))
            .ok_or(RemoteError::NoTarget {
                graph_id,
                worker_id,
            })?;
        deliver(payload)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
