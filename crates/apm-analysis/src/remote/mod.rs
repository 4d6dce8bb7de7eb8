// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Cluster routing of aggregation records.
//!
//! A [`RemoteWorker`] sits right after local minute aggregation. It asks its
//! [`Selector`](crate::selector::Selector) which node owns a record id. Records
//! owned by this node continue down the local graph. Every other record is
//! serialized into a [`RemoteMessage`] and posted to its owner, whose
//! [`RemoteReceiver`] hands it to the [`RemoteDispatcher`]. The dispatcher then
//! forwards it to the downstream nodes of the same worker on that side.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{ConfigError, RemoteError};
use crate::graph::{GraphId, WorkerId};

mod dispatcher;
mod http;
mod receiver;
mod worker;

pub use dispatcher::RemoteDispatcher;
pub use http::HttpRemoteSender;
pub use receiver::RemoteReceiver;
pub use worker::RemoteWorker;

pub const REMOTE_PATH: &str = "/remote";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteNode {
    pub address: String,
}

impl RemoteNode {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl fmt::Display for RemoteNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Parses a comma separated `host:port` list. Blank entries are ignored.
pub fn parse_node_list(value: &str) -> Result<Vec<RemoteNode>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .map(|address| match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(RemoteNode::new(address))
            }
            _ => Err(ConfigError::InvalidValue {
                name: "APM_CLUSTER_NODES",
                value: address.to_string(),
            }),
        })
        .collect()
}

/// The node list every remote worker selects from, plus this node's address.
///
/// Nodes are kept sorted and deduplicated so that every collector configured
/// with the same set computes the same selection.
#[derive(Debug)]
pub struct ClusterView {
    self_node: RemoteNode,
    nodes: RwLock<Arc<Vec<RemoteNode>>>,
}

impl ClusterView {
    #[must_use]
    pub fn new(self_address: impl Into<String>, nodes: Vec<RemoteNode>) -> Self {
        Self {
            self_node: RemoteNode::new(self_address),
            nodes: RwLock::new(Arc::new(normalize(nodes))),
        }
    }

    /// A cluster made of this node only.
    #[must_use]
    pub fn single(self_address: impl Into<String>) -> Self {
        let self_node = RemoteNode::new(self_address);
        Self {
            nodes: RwLock::new(Arc::new(vec![self_node.clone()])),
            self_node,
        }
    }

    pub fn update(&self, nodes: Vec<RemoteNode>) {
        let nodes = Arc::new(normalize(nodes));
        #[allow(clippy::expect_used)]
        let mut current = self.nodes.write().expect("lock poisoned");
        *current = nodes;
    }

    #[must_use]
    pub fn nodes(&self) -> Arc<Vec<RemoteNode>> {
        #[allow(clippy::expect_used)]
        let current = self.nodes.read().expect("lock poisoned");
        Arc::clone(&current)
    }

    #[must_use]
    pub fn self_node(&self) -> &RemoteNode {
        &self.self_node
    }

    #[must_use]
    pub fn is_self(&self, node: &RemoteNode) -> bool {
        *node == self.self_node
    }
}

fn normalize(mut nodes: Vec<RemoteNode>) -> Vec<RemoteNode> {
    nodes.sort();
    nodes.dedup();
    nodes
}

/// A record in flight between two collectors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub graph_id: GraphId,
    pub worker_id: WorkerId,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait RemoteSender: Send + Sync {
    async fn send(&self, node: &RemoteNode, message: RemoteMessage) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_view_normalizes_nodes() {
        let view = ClusterView::new(
            "10.0.0.2:11800",
            vec![
                RemoteNode::new("10.0.0.3:11800"),
                RemoteNode::new("10.0.0.2:11800"),
                RemoteNode::new("10.0.0.3:11800"),
            ],
        );
        assert_eq!(
            *view.nodes(),
            vec![
                RemoteNode::new("10.0.0.2:11800"),
                RemoteNode::new("10.0.0.3:11800")
            ]
        );
        assert!(view.is_self(&RemoteNode::new("10.0.0.2:11800")));
        assert!(!view.is_self(&RemoteNode::new("10.0.0.3:11800")));
    }

    #[test]
    fn test_cluster_view_update() {
        let view = ClusterView::single("127.0.0.1:11800");
        assert_eq!(view.nodes().len(), 1);
        let before = view.nodes();
        view.update(vec![
            RemoteNode::new("127.0.0.1:11801"),
            RemoteNode::new("127.0.0.1:11800"),
        ]);
        assert_eq!(before.len(), 1);
        assert_eq!(view.nodes().len(), 2);
        assert_eq!(view.nodes()[0].address, "127.0.0.1:11800");
    }

    #[test]
    fn test_parse_node_list() {
        let nodes = parse_node_list(" 10.0.0.1:11800, ,collector-b:11800").unwrap();
        assert_eq!(
            nodes,
            vec![
                RemoteNode::new("10.0.0.1:11800"),
                RemoteNode::new("collector-b:11800")
            ]
        );
        assert!(parse_node_list("").unwrap().is_empty());
        assert!(matches!(
            parse_node_list("10.0.0.1"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(parse_node_list("10.0.0.1:http").is_err());
    }

    #[test]
    fn test_remote_message_json() {
        let message = RemoteMessage {
            graph_id: 600,
            worker_id: 60_002,
            payload: serde_json::json!({ "id": "x" }),
        };
        let encoded = serde_json::to_string(&message).unwrap();
        assert_eq!(
            encoded,
            r#"{"graph_id":600,"worker_id":60002,"payload":{"id":"x"}}"#
        );
    }
}
