// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::{Graph, GraphId, Stage};
use crate::errors::GraphError;

/// Lookup table of running graphs keyed by graph id and record type.
///
/// Populated once while wiring the process, then shared behind an `Arc` and
/// only read from the hot path.
#[derive(Default)]
pub struct GraphRegistry {
    graphs: HashMap<(GraphId, TypeId), Box<dyn Any + Send + Sync>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl GraphRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, graph: Graph<T>) -> Result<(), GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        let key = (graph.id(), TypeId::of::<T>());
        if self.graphs.contains_key(&key) {
            return Err(GraphError::DuplicateGraph {
                graph_id: graph.id(),
                record_type: type_name::<T>(),
            });
        }
        #[allow(clippy::expect_used)]
        self.tasks
            .lock()
            .expect("lock poisoned")
            .extend(graph.take_tasks());
        self.graphs.insert(key, Box::new(graph));
        Ok(())
    }

    /// Spawns the workers of `root` and registers the resulting graph.
    pub fn spawn<T>(
        &mut self,
        graph_id: GraphId,
        root: Stage<T>,
        cancel: &CancellationToken,
    ) -> Result<(), GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        if self.graphs.contains_key(&(graph_id, TypeId::of::<T>())) {
            return Err(GraphError::DuplicateGraph {
                graph_id,
                record_type: type_name::<T>(),
            });
        }
        let graph = Graph::spawn(graph_id, root, cancel)?;
        self.register(graph)
    }

    pub fn lookup<T>(&self, graph_id: GraphId) -> Result<&Graph<T>, GraphError>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.graphs
            .get(&(graph_id, TypeId::of::<T>()))
            .and_then(|graph| graph.downcast_ref::<Graph<T>>())
            .ok_or(GraphError::UnknownGraph {
                graph_id,
                record_type: type_name::<T>(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Waits for the worker tasks of every registered graph to finish.
    pub async fn join(&self) {
        let tasks = {
            #[allow(clippy::expect_used)]
            let mut tasks = self.tasks.lock().expect("lock poisoned");
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!("Worker task failed: {e}");
            }
        }
    }
}
