// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use apm_analysis::errors::RemoteError;
use apm_analysis::graph::{Next, Worker, WorkerId};
use apm_analysis::remote::{RemoteMessage, RemoteNode, RemoteSender};
use async_trait::async_trait;

/// Sender that must never be used.
pub struct PanickingSender;

#[async_trait]
impl RemoteSender for PanickingSender {
    async fn send(&self, node: &RemoteNode, _message: RemoteMessage) -> Result<(), RemoteError> {
        panic!("unexpected remote send to {node}");
    }
}

/// Worker recording every record it sees.
pub struct RecordingWorker<T> {
    id: WorkerId,
    seen: Arc<Mutex<Vec<T>>>,
}

impl<T> RecordingWorker<T> {
    pub fn new(id: WorkerId) -> (Self, Arc<Mutex<Vec<T>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                id,
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Worker<T> for RecordingWorker<T> {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        "recording"
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        self.seen.lock().unwrap().push(record.clone());
        next.forward(record);
    }
}
