// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{GraphId, Next, Worker, WorkerId, WorkerRef};
use crate::constants::DEFAULT_QUEUE_SIZE;
use crate::errors::{GraphError, WorkerError};

/// A worker waiting to be spawned, together with the stages it feeds.
pub struct Stage<T> {
    worker: Box<dyn Worker<T>>,
    queue_size: usize,
    children: Vec<Stage<T>>,
}

impl<T: Clone + Send + 'static> Stage<T> {
    #[must_use]
    pub fn new(worker: impl Worker<T>) -> Self {
        Self {
            worker: Box::new(worker),
            queue_size: DEFAULT_QUEUE_SIZE,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size.max(1);
        self
    }

    /// Feeds every record this stage forwards into `child` as well.
    #[must_use]
    pub fn then(mut self, child: Stage<T>) -> Self {
        self.children.push(child);
        self
    }

    fn collect_ids(
        &self,
        graph_id: GraphId,
        seen: &mut HashSet<WorkerId>,
    ) -> Result<(), GraphError> {
        let worker_id = self.worker.id();
        if !seen.insert(worker_id) {
            return Err(GraphError::DuplicateWorker {
                graph_id,
                worker_id,
            });
        }
        self.children
            .iter()
            .try_for_each(|child| child.collect_ids(graph_id, seen))
    }
}

/// A running graph.
pub struct Graph<T> {
    id: GraphId,
    head: WorkerRef<T>,
    downstream: HashMap<WorkerId, Next<T>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Clone + Send + 'static> Graph<T> {
    /// Spawns one task per stage. Must be called from within a tokio runtime.
    ///
    /// When `cancel` fires the head node stops accepting records, drains its
    /// queue and then stops its children the same way, so records already
    /// queued make it through the whole tree.
    pub fn spawn(
        id: GraphId,
        root: Stage<T>,
        cancel: &CancellationToken,
    ) -> Result<Self, GraphError> {
        root.collect_ids(id, &mut HashSet::new())?;

        let mut downstream = HashMap::new();
        let mut tasks = Vec::new();
        let head = spawn_stage(root, cancel.child_token(), &mut downstream, &mut tasks);
        debug!("Graph {id} started with {} workers", tasks.len());

        Ok(Self {
            id,
            head,
            downstream,
            tasks: Mutex::new(tasks),
        })
    }

    #[must_use]
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Injects a record at the head worker.
    pub fn start(&self, record: T) -> Result<(), WorkerError> {
        self.head.tell(record)
    }

    /// Downstream nodes of `worker_id`.
    #[must_use]
    pub fn next_of(&self, worker_id: WorkerId) -> Option<Next<T>> {
        self.downstream.get(&worker_id).cloned()
    }

    pub(crate) fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        #[allow(clippy::expect_used)]
        let mut tasks = self.tasks.lock().expect("lock poisoned");
        std::mem::take(&mut *tasks)
    }

    /// Waits for every node task to finish.
    pub async fn join(&self) {
        for task in self.take_tasks() {
            if let Err(e) = task.await {
                error!("Worker task of graph {} failed: {e}", self.id);
            }
        }
    }
}

fn spawn_stage<T: Clone + Send + 'static>(
    stage: Stage<T>,
    cancel: CancellationToken,
    downstream: &mut HashMap<WorkerId, Next<T>>,
    tasks: &mut Vec<JoinHandle<()>>,
) -> WorkerRef<T> {
    let Stage {
        worker,
        queue_size,
        children,
    } = stage;

    let mut child_cancels = Vec::with_capacity(children.len());
    let mut refs = Vec::with_capacity(children.len());
    for child in children {
        let child_cancel = CancellationToken::new();
        refs.push(spawn_stage(child, child_cancel.clone(), downstream, tasks));
        child_cancels.push(child_cancel);
    }
    let next = Next::new(refs);

    let id = worker.id();
    downstream.insert(id, next.clone());
    let (tx, rx) = mpsc::channel(queue_size);
    tasks.push(tokio::spawn(run_node(
        worker,
        rx,
        next,
        queue_size,
        cancel,
        child_cancels,
    )));
    WorkerRef::new(id, tx)
}

async fn run_node<T: Send + 'static>(
    mut worker: Box<dyn Worker<T>>,
    mut rx: mpsc::Receiver<T>,
    next: Next<T>,
    batch_limit: usize,
    cancel: CancellationToken,
    child_cancels: Vec<CancellationToken>,
) {
    debug!("Worker {} started", worker.name());

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(record) => {
                    worker.on_work(record, &next).await;
                    let mut drained = 1;
                    while drained < batch_limit {
                        let Ok(record) = rx.try_recv() else { break };
                        worker.on_work(record, &next).await;
                        drained += 1;
                    }
                    worker.on_batch_end(&next).await;
                }
                None => break,
            },
        }
    }

    rx.close();
    while let Some(record) = rx.recv().await {
        worker.on_work(record, &next).await;
    }
    worker.on_batch_end(&next).await;
    worker.on_shutdown(&next).await;

    for child in child_cancels {
        child.cancel();
    }
    debug!("Worker {} stopped", worker.name());
}
