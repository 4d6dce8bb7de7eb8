// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use super::{Next, Worker, WorkerId};
use crate::record::AggregationRecord;
use crate::time_bucket::{rebucket, Granularity};

/// Re-keys records into the enclosing bucket of a coarser granularity.
pub struct GranularityWorker {
    id: WorkerId,
    name: String,
    granularity: Granularity,
}

impl GranularityWorker {
    #[must_use]
    pub fn new(id: WorkerId, name: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            id,
            name: name.into(),
            granularity,
        }
    }
}

#[async_trait]
impl<T: AggregationRecord> Worker<T> for GranularityWorker {
    fn id(&self) -> WorkerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn on_work(&mut self, record: T, next: &Next<T>) {
        let time_bucket = rebucket(record.time_bucket(), self.granularity);
        next.forward(record.with_time_bucket(time_bucket));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::test_support::{Collected, CollectingWorker};
    use crate::graph::{Graph, Stage};
    use crate::record::InstanceMapping;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_rebuckets_to_day() {
        let cancel = CancellationToken::new();
        let collected = Collected::default();
        let root = Stage::new(GranularityWorker::new(1, "day", Granularity::Day))
            .then(Stage::new(CollectingWorker::new(2, collected.clone())));
        let graph = Graph::spawn(10, root, &cancel).expect("spawn failed");

        graph
            .start(InstanceMapping::new(201_803_061_542, 1, 7, 21))
            .unwrap();

        cancel.cancel();
        graph.join().await;

        let records = collected.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "20180306_7_21");
        assert_eq!(records[0].time_bucket, 20_180_306);
    }

    #[tokio::test]
    async fn test_chained_workers_rebucket_from_their_input() {
        let cancel = CancellationToken::new();
        let days = Collected::default();
        let months = Collected::default();
        let root = Stage::new(GranularityWorker::new(1, "hour", Granularity::Hour)).then(
            Stage::new(GranularityWorker::new(2, "day", Granularity::Day))
                .then(Stage::new(CollectingWorker::new(3, days.clone())))
                .then(
                    Stage::new(GranularityWorker::new(4, "month", Granularity::Month))
                        .then(Stage::new(CollectingWorker::new(5, months.clone()))),
                ),
        );
        let graph = Graph::spawn(10, root, &cancel).expect("spawn failed");

        graph
            .start(InstanceMapping::new(201_803_061_542, 1, 7, 21))
            .unwrap();

        cancel.cancel();
        graph.join().await;

        let days = days.records();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].id, "20180306_7_21");
        let months = months.records();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].id, "201803_7_21");
        assert_eq!(months[0].time_bucket, 201_803);
    }
}
