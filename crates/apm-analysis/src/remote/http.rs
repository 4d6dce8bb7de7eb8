// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{RemoteMessage, RemoteNode, RemoteSender, REMOTE_PATH};
use crate::errors::RemoteError;

/// Posts remote messages as JSON to `http://{address}/remote`.
#[derive(Clone, Debug)]
pub struct HttpRemoteSender {
    client: reqwest::Client,
}

impl HttpRemoteSender {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteSender for HttpRemoteSender {
    async fn send(&self, node: &RemoteNode, message: RemoteMessage) -> Result<(), RemoteError> {
        let url = format!("http://{}{REMOTE_PATH}", node.address);
        let response = self
            .client
            .post(&url)
            .json(&message)
            .send()
            .await
            .map_err(|e| RemoteError::Transport {
                address: node.address.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Transport {
                address: node.address.clone(),
                reason: format!("unexpected status {status}"),
            });
        }
        debug!(
            "Delivered record for graph {} to {node}",
            message.graph_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn message() -> RemoteMessage {
        RemoteMessage {
            graph_id: 600,
            worker_id: 60_002,
            payload: json!({ "id": "201803061542_7_3" }),
        }
    }

    #[tokio::test]
    async fn test_send_posts_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/remote")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "graph_id": 600,
                "worker_id": 60002,
                "payload": { "id": "201803061542_7_3" }
            })))
            .with_status(202)
            .create_async()
            .await;

        let sender = HttpRemoteSender::new(Duration::from_secs(2)).unwrap();
        let node = RemoteNode::new(server.host_with_port());
        sender.send(&node, message()).await.expect("send failed");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_a_transport_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/remote")
            .with_status(404)
            .create_async()
            .await;

        let sender = HttpRemoteSender::new(Duration::from_secs(2)).unwrap();
        let node = RemoteNode::new(server.host_with_port());
        let result = sender.send(&node, message()).await;
        assert!(matches!(result, Err(RemoteError::Transport { .. })));
    }
}
