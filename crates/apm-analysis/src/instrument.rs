// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Timing and throughput of graph computations.
//!
//! Instrumentation is applied by wrapping a worker when the graph is wired:
//!
//! ```rust,ignore
//! let worker = instrument(
//!     persistence_worker,
//!     "/persistence/onWork/instance_metric/day",
//!     &metrics,
//! );
//! ```
//!
//! Every call to the wrapped `on_work` is timed and accumulated under the label
//! in a shared [`ComputingMetrics`] table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use crate::graph::{Next, Worker, WorkerId};

/// Accumulated timings of one label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricSample {
    pub calls: u64,
    pub total_nanos: u64,
    pub max_nanos: u64,
}

impl MetricSample {
    #[must_use]
    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_nanos / self.calls)
    }
}

#[derive(Debug, Default)]
pub struct ComputingMetrics {
    samples: Mutex<HashMap<String, MetricSample>>,
}

impl ComputingMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, label: &str, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        #[allow(clippy::expect_used)]
        let mut samples = self.samples.lock().expect("lock poisoned");
        let sample = samples.entry(label.to_string()).or_default();
        sample.calls += 1;
        sample.total_nanos = sample.total_nanos.saturating_add(nanos);
        sample.max_nanos = sample.max_nanos.max(nanos);
        trace!("{label} took {nanos}ns");
    }

    #[must_use]
    pub fn get(&self, label: &str) -> Option<MetricSample> {
        #[allow(clippy::expect_used)]
        let samples = self.samples.lock().expect("lock poisoned");
        samples.get(label).copied()
    }

    /// Labels and samples, sorted by label.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, MetricSample)> {
        #[allow(clippy::expect_used)]
        let samples = self.samples.lock().expect("lock poisoned");
        let mut snapshot: Vec<_> = samples
            .iter()
            .map(|(label, sample)| (label.clone(), *sample))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Runs `f` and records how long it took under `label`.
    pub fn time<R>(&self, label: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }
}

/// A worker whose `on_work` is timed under a fixed label.
pub struct Instrumented<W> {
    inner: W,
    label: String,
    metrics: Arc<ComputingMetrics>,
}

#[must_use]
pub fn instrument<W>(
    worker: W,
    label: impl Into<String>,
    metrics: &Arc<ComputingMetrics>,
) -> Instrumented<W> {
    Instrumented {
        inner: worker,
        label: label.into(),
        metrics: Arc::clone(metrics),
    }
}

#[async_trait]
impl<T, W> Worker<T> for Instrumented<W>
where
    T: Send + 'static,
    W: Worker<T>,
{
    fn id(&self) -> WorkerId {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        let start = Instant::now();
        self.inner.on_work(record, next).await;
        self.metrics.record(&self.label, start.elapsed());
    }

    async fn on_batch_end(&mut self, next: &Next<T>) {
        self.inner.on_batch_end(next).await;
    }

    async fn on_shutdown(&mut self, next: &Next<T>) {
        self.inner.on_shutdown(next).await;
    }
}
