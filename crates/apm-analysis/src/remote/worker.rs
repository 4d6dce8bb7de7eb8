// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::{ClusterView, RemoteMessage, RemoteSender};
use crate::constants::DEFAULT_REMOTE_MAX_IN_FLIGHT;
use crate::graph::{GraphId, Next, Worker, WorkerId};
use crate::record::AggregationRecord;
use crate::selector::Selector;

/// Routes each record to the node that owns its id.
///
/// At most `max_in_flight` sends run at once. A record routed elsewhere while
/// that many are pending is dropped.
pub struct RemoteWorker<T> {
    id: WorkerId,
    graph_id: GraphId,
    name: String,
    selector: Arc<dyn Selector>,
    cluster: Arc<ClusterView>,
    sender: Arc<dyn RemoteSender>,
    in_flight: Arc<Semaphore>,
    max_in_flight: usize,
    _record: PhantomData<fn(T)>,
}

impl<T> RemoteWorker<T> {
    #[must_use]
    pub fn new(
        id: WorkerId,
        graph_id: GraphId,
        selector: Arc<dyn Selector>,
        cluster: Arc<ClusterView>,
        sender: Arc<dyn RemoteSender>,
    ) -> Self {
        Self {
            id,
            graph_id,
            name: format!("remote/{graph_id}"),
            selector,
            cluster,
            sender,
            in_flight: Arc::new(Semaphore::new(DEFAULT_REMOTE_MAX_IN_FLIGHT)),
            max_in_flight: DEFAULT_REMOTE_MAX_IN_FLIGHT,
            _record: PhantomData,
        }
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        self.in_flight = Arc::new(Semaphore::new(max_in_flight));
        self.max_in_flight = max_in_flight;
        self
    }
}

#[async_trait]
impl<T: AggregationRecord> Worker<T> for RemoteWorker<T> {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        let nodes = self.cluster.nodes();
        let node = match self.selector.select(&nodes, record.id()) {
            Some(node) if !self.cluster.is_self(node) => node.clone(),
            _ => {
                next.forward(record);
                return;
            }
        };

        let Ok(permit) = Arc::clone(&self.in_flight).try_acquire_owned() else {
            warn!(
                "Dropping record {} for {node}: {} sends in flight",
                record.id(),
                self.max_in_flight
            );
            return;
        };

        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize record {}: {e}", record.id());
                return;
            }
        };
        let message = RemoteMessage {
            graph_id: self.graph_id,
            worker_id: self.id,
            payload,
        };
        debug!("Sending record {} to {node}", record.id());

        let sender = Arc::clone(&self.sender);
        tokio::spawn(async move {
            if let Err(e) = sender.send(&node, message).await {
                error!("Failed to send record to remote collector: {e}");
            }
            drop(permit);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RemoteError;
    use crate::graph::test_support::{Collected, CollectingWorker};
    use crate::graph::{Graph, Stage};
    use crate::record::InstanceMapping;
    use crate::remote::RemoteNode;
    use crate::selector::{ForeverFirstSelector, HashCodeSelector};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(RemoteNode, RemoteMessage)>>,
        notify: Notify,
    }

    #[async_trait]
    impl RemoteSender for RecordingSender {
        async fn send(&self, node: &RemoteNode, message: RemoteMessage) -> Result<(), RemoteError> {
            self.sent.lock().unwrap().push((node.clone(), message));
            self.notify.notify_one();
            Ok(())
        }
    }

    fn spawn_graph(
        cluster: ClusterView,
        selector: Arc<dyn Selector>,
        sender: &Arc<RecordingSender>,
        local: &Collected<InstanceMapping>,
        cancel: &CancellationToken,
    ) -> Graph<InstanceMapping> {
        let sender: Arc<dyn RemoteSender> = Arc::clone(sender) as Arc<dyn RemoteSender>;
        let root = Stage::new(RemoteWorker::new(
            60_002,
            600,
            selector,
            Arc::new(cluster),
            sender,
        ))
        .then(Stage::new(CollectingWorker::new(60_003, local.clone())));
        Graph::spawn(600, root, cancel).expect("spawn failed")
    }

    #[tokio::test]
    async fn test_self_owned_record_stays_local() {
        let cancel = CancellationToken::new();
        let sender = Arc::new(RecordingSender::default());
        let local = Collected::default();
        let graph = spawn_graph(
            ClusterView::single("127.0.0.1:11800"),
            Arc::new(HashCodeSelector),
            &sender,
            &local,
            &cancel,
        );

        graph
            .start(InstanceMapping::new(201_803_061_542, 2, 7, 3))
            .unwrap();
        cancel.cancel();
        graph.join().await;

        assert_eq!(local.records().len(), 1);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_cluster_processes_locally() {
        let cancel = CancellationToken::new();
        let sender = Arc::new(RecordingSender::default());
        let local = Collected::default();
        let graph = spawn_graph(
            ClusterView::new("127.0.0.1:11800", Vec::new()),
            Arc::new(HashCodeSelector),
            &sender,
            &local,
            &cancel,
        );

        graph
            .start(InstanceMapping::new(201_803_061_542, 2, 7, 3))
            .unwrap();
        cancel.cancel();
        graph.join().await;

        assert_eq!(local.records().len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_record_is_sent() {
        let cancel = CancellationToken::new();
        let sender = Arc::new(RecordingSender::default());
        let local = Collected::default();
        let graph = spawn_graph(
            ClusterView::new(
                "10.0.0.2:11800",
                vec![
                    RemoteNode::new("10.0.0.1:11800"),
                    RemoteNode::new("10.0.0.2:11800"),
                ],
            ),
            Arc::new(ForeverFirstSelector),
            &sender,
            &local,
            &cancel,
        );

        let mapping = InstanceMapping::new(201_803_061_542, 2, 7, 3);
        let notified = sender.notify.notified();
        graph.start(mapping.clone()).unwrap();
        notified.await;
        cancel.cancel();
        graph.join().await;

        assert!(local.records().is_empty());
        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (node, message) = &sent[0];
        assert_eq!(node.address, "10.0.0.1:11800");
        assert_eq!(message.graph_id, 600);
        assert_eq!(message.worker_id, 60_002);
        let decoded: InstanceMapping = serde_json::from_value(message.payload.clone()).unwrap();
        assert_eq!(decoded, mapping);
    }

    /// Sender whose sends wait until `release` gets permits.
    struct GatedSender {
        started: Mutex<usize>,
        release: Semaphore,
    }

    impl GatedSender {
        fn new() -> Self {
            Self {
                started: Mutex::new(0),
                release: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl RemoteSender for GatedSender {
        async fn send(&self, _node: &RemoteNode, _message: RemoteMessage) -> Result<(), RemoteError> {
            *self.started.lock().unwrap() += 1;
            let _permit = self.release.acquire().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sends_beyond_the_in_flight_limit_are_dropped() {
        let cancel = CancellationToken::new();
        let sender = Arc::new(GatedSender::new());
        let cluster = ClusterView::new(
            "10.0.0.2:11800",
            vec![
                RemoteNode::new("10.0.0.1:11800"),
                RemoteNode::new("10.0.0.2:11800"),
            ],
        );
        let root = Stage::new(
            RemoteWorker::new(
                60_002,
                600,
                Arc::new(ForeverFirstSelector),
                Arc::new(cluster),
                Arc::clone(&sender) as Arc<dyn RemoteSender>,
            )
            .with_max_in_flight(2),
        );
        let graph = Graph::spawn(600, root, &cancel).expect("spawn failed");

        for address_id in 1..=3 {
            graph
                .start(InstanceMapping::new(201_803_061_542, 2, 7, address_id))
                .unwrap();
        }
        cancel.cancel();
        graph.join().await;

        let started = tokio::time::timeout(Duration::from_secs(5), async {
            while *sender.started.lock().unwrap() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(started.is_ok());

        // the third record was dropped, not queued behind the pending sends
        sender.release.add_permits(3);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*sender.started.lock().unwrap(), 2);
    }
}
