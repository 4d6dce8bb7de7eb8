// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of every aggregation graph.
//!
//! Metric and mapping graphs share one shape. Worker ids are
//! `graph_id * 100 + slot`:
//!
//! ```text
//! aggregation(1) -> remote(2) -> persistence/minute(3)
//!                                   +-> granularity/hour(4)  -> persistence/hour(5)
//!                                   +-> granularity/day(6)   -> persistence/day(7)
//!                                   +-> granularity/month(8) -> persistence/month(9)
//! ```
//!
//! Each granularity branch re-keys the minute record it receives.
//!
//! The global trace graph is a single persistence worker writing without
//! merge-with-db, since correlation rows never change once written.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::constants::{
    APPLICATION_MAPPING_GRAPH_ID, APPLICATION_MAPPING_TABLE, APPLICATION_METRIC_GRAPH_ID,
    APPLICATION_METRIC_TABLE, DEFAULT_QUEUE_SIZE, DEFAULT_REMOTE_MAX_IN_FLIGHT,
    GLOBAL_TRACE_GRAPH_ID, GLOBAL_TRACE_TABLE, INSTANCE_MAPPING_GRAPH_ID, INSTANCE_MAPPING_TABLE,
    INSTANCE_METRIC_GRAPH_ID, INSTANCE_METRIC_TABLE, SERVICE_METRIC_GRAPH_ID,
    SERVICE_METRIC_TABLE, SERVICE_REFERENCE_METRIC_GRAPH_ID, SERVICE_REFERENCE_METRIC_TABLE,
};
use crate::errors::PipelineError;
use crate::graph::{
    AggregationWorker, Graph, GraphId, GraphRegistry, GranularityWorker, Stage, WorkerId,
};
use crate::instrument::{instrument, ComputingMetrics};
use crate::listener::{ListenerRegistry, SegmentParser};
use crate::persistence::{Flushable, PersistenceTimer, PersistenceWorker, StorageProvider};
use crate::record::{
    AggregationRecord, ApplicationMapping, ApplicationMetric, GlobalTrace, InstanceMapping,
    InstanceMetric, ServiceMetric, ServiceReferenceMetric,
};
use crate::remote::{ClusterView, RemoteDispatcher, RemoteSender, RemoteWorker};
use crate::selector::SelectorKind;
use crate::time_bucket::Granularity;

const AGGREGATION_SLOT: WorkerId = 1;
const REMOTE_SLOT: WorkerId = 2;
const MINUTE_PERSISTENCE_SLOT: WorkerId = 3;

#[must_use]
pub fn worker_id(graph_id: GraphId, slot: WorkerId) -> WorkerId {
    graph_id * 100 + slot
}

/// Storage table of `table` records at `granularity`.
#[must_use]
pub fn table_name(table: &str, granularity: Granularity) -> String {
    format!("{table}_{}", granularity.suffix())
}

pub struct PipelineOptions {
    pub queue_size: usize,
    /// pending remote sends per remote worker
    pub remote_max_in_flight: usize,
    pub selector: SelectorKind,
    pub cluster: Arc<ClusterView>,
    pub sender: Arc<dyn RemoteSender>,
}

impl PipelineOptions {
    #[must_use]
    pub fn new(cluster: Arc<ClusterView>, sender: Arc<dyn RemoteSender>) -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            remote_max_in_flight: DEFAULT_REMOTE_MAX_IN_FLIGHT,
            selector: SelectorKind::default(),
            cluster,
            sender,
        }
    }
}

/// Running graphs plus everything needed to feed and flush them.
pub struct MetricPipeline {
    graphs: Arc<GraphRegistry>,
    dispatcher: Arc<RemoteDispatcher>,
    flushables: Vec<Arc<dyn Flushable>>,
    metrics: Arc<ComputingMetrics>,
}

impl MetricPipeline {
    /// Spawns every graph. Must be called from within a tokio runtime.
    ///
    /// Fails when `storage` has no DAO for one of the tables.
    pub fn build<S: StorageProvider>(
        options: &PipelineOptions,
        storage: &S,
        cancel: &CancellationToken,
    ) -> Result<Self, PipelineError> {
        let mut wiring = Wiring {
            options,
            storage,
            cancel,
            graphs: GraphRegistry::new(),
            dispatcher: RemoteDispatcher::new(),
            flushables: Vec::new(),
            metrics: Arc::new(ComputingMetrics::new()),
        };

        wiring.metric_graph::<ApplicationMetric>(
            APPLICATION_METRIC_GRAPH_ID,
            APPLICATION_METRIC_TABLE,
        )?;
        wiring.metric_graph::<InstanceMetric>(INSTANCE_METRIC_GRAPH_ID, INSTANCE_METRIC_TABLE)?;
        wiring.metric_graph::<ServiceMetric>(SERVICE_METRIC_GRAPH_ID, SERVICE_METRIC_TABLE)?;
        wiring.metric_graph::<ServiceReferenceMetric>(
            SERVICE_REFERENCE_METRIC_GRAPH_ID,
            SERVICE_REFERENCE_METRIC_TABLE,
        )?;
        wiring.metric_graph::<ApplicationMapping>(
            APPLICATION_MAPPING_GRAPH_ID,
            APPLICATION_MAPPING_TABLE,
        )?;
        wiring
            .metric_graph::<InstanceMapping>(INSTANCE_MAPPING_GRAPH_ID, INSTANCE_MAPPING_TABLE)?;
        wiring.global_trace_graph()?;

        debug!(
            "Pipeline started with {} graphs and {} persistence workers",
            wiring.graphs.len(),
            wiring.flushables.len()
        );
        Ok(Self {
            graphs: Arc::new(wiring.graphs),
            dispatcher: Arc::new(wiring.dispatcher),
            flushables: wiring.flushables,
            metrics: wiring.metrics,
        })
    }

    #[must_use]
    pub fn graphs(&self) -> &Arc<GraphRegistry> {
        &self.graphs
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<RemoteDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn flushables(&self) -> &[Arc<dyn Flushable>] {
        &self.flushables
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ComputingMetrics> {
        &self.metrics
    }

    /// Parser feeding segments into these graphs through the built-in
    /// listeners.
    #[must_use]
    pub fn segment_parser(&self) -> SegmentParser {
        SegmentParser::new(
            ListenerRegistry::with_default_listeners(Arc::clone(&self.metrics)),
            Arc::clone(&self.graphs),
            Arc::clone(&self.metrics),
        )
    }

    /// Timer flushing every persistence worker of this pipeline.
    #[must_use]
    pub fn persistence_timer(&self, interval: Duration) -> PersistenceTimer {
        PersistenceTimer::new(self.flushables.clone(), interval)
            .with_metrics(Arc::clone(&self.metrics))
    }

    /// Waits for every worker to drain once the pipeline's token is cancelled.
    pub async fn join(&self) {
        self.graphs.join().await;
    }
}

struct Wiring<'a, S> {
    options: &'a PipelineOptions,
    storage: &'a S,
    cancel: &'a CancellationToken,
    graphs: GraphRegistry,
    dispatcher: RemoteDispatcher,
    flushables: Vec<Arc<dyn Flushable>>,
    metrics: Arc<ComputingMetrics>,
}

impl<S: StorageProvider> Wiring<'_, S> {
    fn stage<T: AggregationRecord>(&self, stage: Stage<T>) -> Stage<T> {
        stage.queue_size(self.options.queue_size)
    }

    fn persistence_stage<T: AggregationRecord>(
        &mut self,
        id: WorkerId,
        table: &str,
        storage_table: &str,
        granularity: Granularity,
        need_merge_db_data: bool,
    ) -> Result<Stage<T>, PipelineError> {
        let dao = self.storage.dao::<T>(storage_table)?;
        let name = format!("{table}/{}", granularity.suffix());
        let worker = PersistenceWorker::new(id, name.clone(), dao, need_merge_db_data);
        self.flushables.push(Arc::new(worker.handle()));
        let worker = instrument(
            worker,
            format!("/persistence/onWork/{name}"),
            &self.metrics,
        );
        Ok(self.stage(Stage::new(worker)))
    }

    fn metric_graph<T: AggregationRecord>(
        &mut self,
        graph_id: GraphId,
        table: &str,
    ) -> Result<(), PipelineError> {
        let mut minute = self.persistence_stage::<T>(
            worker_id(graph_id, MINUTE_PERSISTENCE_SLOT),
            table,
            &table_name(table, Granularity::Minute),
            Granularity::Minute,
            true,
        )?;
        // every coarser granularity branches off the minute persistence worker
        for (index, granularity) in Granularity::ALL.into_iter().enumerate().skip(1) {
            let index = WorkerId::try_from(index).unwrap_or_default();
            let slot = MINUTE_PERSISTENCE_SLOT + 2 * index - 1;
            let persistence = self.persistence_stage::<T>(
                worker_id(graph_id, slot + 1),
                table,
                &table_name(table, granularity),
                granularity,
                true,
            )?;
            let branch = self
                .stage(Stage::new(GranularityWorker::new(
                    worker_id(graph_id, slot),
                    format!("{table}/granularity/{}", granularity.suffix()),
                    granularity,
                )))
                .then(persistence);
            minute = minute.then(branch);
        }

        let remote_id = worker_id(graph_id, REMOTE_SLOT);
        let remote = self.stage(Stage::new(
            RemoteWorker::new(
                remote_id,
                graph_id,
                self.options.selector.build(),
                Arc::clone(&self.options.cluster),
                Arc::clone(&self.options.sender),
            )
            .with_max_in_flight(self.options.remote_max_in_flight),
        ));
        let remote = remote.then(minute);
        let root = self
            .stage(Stage::new(AggregationWorker::new(
                worker_id(graph_id, AGGREGATION_SLOT),
                format!("{table}/aggregation"),
            )))
            .then(remote);

        let graph = Graph::spawn(graph_id, root, self.cancel)?;
        self.dispatcher.bind(&graph, remote_id)?;
        self.graphs.register(graph)?;
        Ok(())
    }

    fn global_trace_graph(&mut self) -> Result<(), PipelineError> {
        let root = self.persistence_stage::<GlobalTrace>(
            worker_id(GLOBAL_TRACE_GRAPH_ID, 1),
            GLOBAL_TRACE_TABLE,
            GLOBAL_TRACE_TABLE,
            Granularity::Minute,
            false,
        )?;
        self.graphs.spawn(GLOBAL_TRACE_GRAPH_ID, root, self.cancel)?;
        Ok(())
    }
}
