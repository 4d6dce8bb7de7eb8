// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{http, Method, Request, Response, StatusCode};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{RemoteDispatcher, RemoteMessage, REMOTE_PATH};
use crate::errors::RemoteError;

/// Largest accepted remote message. A message carries a single record.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// HTTP endpoint accepting records routed here by other collectors.
pub struct RemoteReceiver {
    dispatcher: Arc<RemoteDispatcher>,
}

impl RemoteReceiver {
    #[must_use]
    pub fn new(dispatcher: Arc<RemoteDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Serves connections from `listener` until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> io::Result<()> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();
        if let Ok(address) = listener.local_addr() {
            debug!("Remote receiver listening on {address}");
        }

        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Remote receiver error: {e}");
                        return Err(e);
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Err(e) = finished {
                        if e.is_panic() {
                            error!("Connection handler panicked: {e:?}");
                        }
                    }
                    continue;
                },
            };

            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let dispatcher = Arc::clone(&self.dispatcher);
            joinset.spawn(async move {
                let service = service_fn(move |req| handle(Arc::clone(&dispatcher), req));
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }

        joinset.shutdown().await;
        debug!("Remote receiver stopped");
        Ok(())
    }
}

async fn handle(
    dispatcher: Arc<RemoteDispatcher>,
    req: Request<Incoming>,
) -> http::Result<Response<Full<Bytes>>> {
    if req.uri().path() != REMOTE_PATH {
        return respond("Not found", StatusCode::NOT_FOUND);
    }
    if req.method() != Method::POST {
        return respond("Method not allowed", StatusCode::METHOD_NOT_ALLOWED);
    }

    let body = match Limited::new(req.into_body(), MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return respond("Remote message too large", StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            return respond(
                &format!("Error reading request body: {e}"),
                StatusCode::BAD_REQUEST,
            );
        }
    };
    let message: RemoteMessage = match serde_json::from_slice(&body) {
        Ok(message) => message,
        Err(e) => return respond(&format!("Error decoding remote message: {e}"), StatusCode::BAD_REQUEST),
    };

    match dispatcher.dispatch(message) {
        Ok(()) => respond("Accepted record", StatusCode::ACCEPTED),
        Err(e @ RemoteError::NoTarget { .. }) => respond(&e.to_string(), StatusCode::NOT_FOUND),
        Err(e) => respond(&e.to_string(), StatusCode::BAD_REQUEST),
    }
}

fn respond(message: &str, status: StatusCode) -> http::Result<Response<Full<Bytes>>> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{Collected, CollectingWorker, PassThroughWorker};
    use crate::graph::{Graph, Stage};
    use crate::record::InstanceMapping;

    async fn start(dispatcher: RemoteDispatcher) -> (String, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let cancel = CancellationToken::new();
        let receiver = RemoteReceiver::new(Arc::new(dispatcher));
        tokio::spawn(receiver.serve(listener, cancel.clone()));
        (address, cancel)
    }

    #[tokio::test]
    async fn test_receiver_status_codes() {
        let graph_cancel = CancellationToken::new();
        let collected = Collected::default();
        let root = Stage::new(PassThroughWorker::new(1))
            .then(Stage::new(CollectingWorker::new(2, collected.clone())));
        let graph = Graph::<InstanceMapping>::spawn(600, root, &graph_cancel).unwrap();
        let mut dispatcher = RemoteDispatcher::new();
        dispatcher.bind(&graph, 1).unwrap();
        let (address, cancel) = start(dispatcher).await;

        let client = reqwest::Client::new();
        let url = format!("http://{address}{REMOTE_PATH}");
        let mapping = InstanceMapping::new(201_803_061_542, 2, 7, 3);

        let accepted = client
            .post(&url)
            .json(&RemoteMessage {
                graph_id: 600,
                worker_id: 1,
                payload: serde_json::to_value(&mapping).unwrap(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

        let unknown = client
            .post(&url)
            .json(&RemoteMessage {
                graph_id: 600,
                worker_id: 5,
                payload: serde_json::to_value(&mapping).unwrap(),
            })
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

        let garbage = client.post(&url).body("not json").send().await.unwrap();
        assert_eq!(garbage.status(), reqwest::StatusCode::BAD_REQUEST);

        let oversized = client
            .post(&url)
            .body(vec![b' '; MAX_BODY_SIZE + 1])
            .send()
            .await
            .unwrap();
        assert_eq!(oversized.status(), reqwest::StatusCode::PAYLOAD_TOO_LARGE);

        let wrong_path = client
            .post(format!("http://{address}/other"))
            .send()
            .await
            .unwrap();
        assert_eq!(wrong_path.status(), reqwest::StatusCode::NOT_FOUND);

        cancel.cancel();
        graph_cancel.cancel();
        graph.join().await;
        assert_eq!(collected.records(), vec![mapping]);
    }
}
