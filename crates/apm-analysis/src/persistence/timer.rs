// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{FlushReport, Flushable};
use crate::instrument::ComputingMetrics;

/// Drives `flush_and_switch` of every persistence worker on a fixed interval.
pub struct PersistenceTimer {
    workers: Vec<Arc<dyn Flushable>>,
    interval: Duration,
    metrics: Option<Arc<ComputingMetrics>>,
}

impl PersistenceTimer {
    #[must_use]
    pub fn new(workers: Vec<Arc<dyn Flushable>>, interval: Duration) -> Self {
        Self {
            workers,
            interval,
            metrics: None,
        }
    }

    /// Records the duration of each worker's flush under `/persistence/flush/{name}`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ComputingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Flushes every worker once, one after another. Failures are logged and
    /// do not stop the remaining workers.
    pub async fn flush_all(&self) -> FlushReport {
        let mut total = FlushReport::default();
        for worker in &self.workers {
            let start = Instant::now();
            match worker.flush_and_switch().await {
                Ok(report) => {
                    total.inserted += report.inserted;
                    total.updated += report.updated;
                    total.deferred += report.deferred;
                }
                Err(e) => error!("Failed to flush {}: {e}", worker.name()),
            }
            if let Some(metrics) = &self.metrics {
                metrics.record(
                    &format!("/persistence/flush/{}", worker.name()),
                    start.elapsed(),
                );
            }
        }
        total
    }

    /// Flushes on every tick until `cancel` fires, then flushes one last time.
    pub async fn run(self, cancel: CancellationToken) {
        let mut flush_interval = interval(self.interval);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = flush_interval.tick() => {
                    let report = self.flush_all().await;
                    if !report.is_empty() {
                        debug!(
                            "Persisted {} inserts and {} updates, {} deferred",
                            report.inserted, report.updated, report.deferred
                        );
                    }
                }
            }
        }

        let report = self.flush_all().await;
        debug!(
            "Final flush persisted {} inserts and {} updates, {} deferred",
            report.inserted, report.updated, report.deferred
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFlushable {
        name: String,
        flushes: AtomicUsize,
        fail: bool,
    }

    impl CountingFlushable {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                flushes: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl Flushable for CountingFlushable {
        fn name(&self) -> &str {
            &self.name
        }

        async fn flush_and_switch(&self) -> Result<FlushReport, StorageError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::Write {
                    table: self.name.clone(),
                    reason: "down".to_string(),
                });
            }
            Ok(FlushReport {
                inserted: 1,
                ..FlushReport::default()
            })
        }
    }

    #[tokio::test]
    async fn test_flush_all_continues_after_failure() {
        let failing = CountingFlushable::new("a/minute", true);
        let healthy = CountingFlushable::new("b/minute", false);
        let metrics = Arc::new(ComputingMetrics::new());
        let workers: Vec<Arc<dyn Flushable>> = vec![
            failing.clone() as Arc<dyn Flushable>,
            healthy.clone() as Arc<dyn Flushable>,
        ];
        let timer =
            PersistenceTimer::new(workers, Duration::from_secs(3)).with_metrics(metrics.clone());

        let report = timer.flush_all().await;
        assert_eq!(report.inserted, 1);
        assert_eq!(failing.flushes.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.flushes.load(Ordering::SeqCst), 1);
        assert!(metrics.get("/persistence/flush/b/minute").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_on_interval_and_on_cancel() {
        let worker = CountingFlushable::new("a/minute", false);
        let timer = PersistenceTimer::new(
            vec![worker.clone() as Arc<dyn Flushable>],
            Duration::from_secs(3),
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(timer.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(6_500)).await;
        assert_eq!(worker.flushes.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
        assert_eq!(worker.flushes.load(Ordering::SeqCst), 3);
    }
}
