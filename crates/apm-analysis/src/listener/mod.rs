// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Turning trace segments into aggregation records.
//!
//! For every segment the [`SegmentParser`] asks the [`ListenerRegistry`] for a
//! fresh set of [`SpanListener`]s, walks the segment's spans and global trace
//! ids, and hands each one to the listeners that declared the matching
//! [`Point`]. Once the whole segment has been seen, every listener's `build`
//! pushes the records it accumulated into its graph.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::ListenerError;
use crate::graph::{GraphId, GraphRegistry};
use crate::instrument::ComputingMetrics;
use crate::record::AggregationRecord;

mod global_trace;
mod mapping;
mod metric;
mod parser;
mod segment;
mod service;

pub use global_trace::GlobalTraceSpanListener;
pub use mapping::{ApplicationMappingSpanListener, InstanceMappingSpanListener};
pub use metric::{ApplicationMetricSpanListener, InstanceMetricSpanListener};
pub use parser::SegmentParser;
pub use segment::{ReferenceDecorator, Segment, SpanDecorator, SpanLayer, SpanType, UniqueId};
pub use service::{ServiceMetricSpanListener, ServiceReferenceMetricSpanListener};

/// Places in a segment a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Point {
    First,
    Entry,
    Exit,
    Local,
    GlobalTraceIds,
}

/// Identity of the segment being parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentContext {
    pub segment_id: String,
    pub application_id: i32,
    pub application_instance_id: i32,
}

impl From<&Segment> for SegmentContext {
    fn from(segment: &Segment) -> Self {
        Self {
            segment_id: segment.segment_id.clone(),
            application_id: segment.application_id,
            application_instance_id: segment.application_instance_id,
        }
    }
}

/// Per-segment accumulator of records.
///
/// A listener instance only ever sees one segment. The parser calls the
/// `parse_*` methods for the points listed by [`SpanListener::points`], then
/// `build` exactly once.
pub trait SpanListener: Send {
    fn points(&self) -> &'static [Point];

    fn contains_point(&self, point: Point) -> bool {
        self.points().contains(&point)
    }

    fn parse_first(
        &mut self,
        _span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn parse_entry(
        &mut self,
        _span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn parse_exit(
        &mut self,
        _span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn parse_local(
        &mut self,
        _span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    fn parse_global_trace_id(
        &mut self,
        _id: &UniqueId,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Pushes the accumulated records into their graphs.
    fn build(self: Box<Self>, graphs: &GraphRegistry);
}

pub trait SpanListenerFactory: Send + Sync {
    /// Short name used in instrumentation labels.
    fn name(&self) -> &str;

    fn create(&self) -> Box<dyn SpanListener>;
}

/// Factory for listeners that start out in their `Default` state.
pub struct DefaultListenerFactory<L> {
    name: &'static str,
    _listener: PhantomData<fn() -> L>,
}

impl<L> DefaultListenerFactory<L> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            _listener: PhantomData,
        }
    }
}

impl<L: SpanListener + Default + 'static> SpanListenerFactory for DefaultListenerFactory<L> {
    fn name(&self) -> &str {
        self.name
    }

    fn create(&self) -> Box<dyn SpanListener> {
        Box::<L>::default()
    }
}

/// Ordered set of listener factories.
pub struct ListenerRegistry {
    factories: Vec<(String, Box<dyn SpanListenerFactory>)>,
    metrics: Arc<ComputingMetrics>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new(metrics: Arc<ComputingMetrics>) -> Self {
        Self {
            factories: Vec::new(),
            metrics,
        }
    }

    /// Registry holding every built-in listener.
    #[must_use]
    pub fn with_default_listeners(metrics: Arc<ComputingMetrics>) -> Self {
        let mut registry = Self::new(metrics);
        registry.register(DefaultListenerFactory::<GlobalTraceSpanListener>::new(
            "globalTraceSpanListener",
        ));
        registry.register(DefaultListenerFactory::<InstanceMappingSpanListener>::new(
            "instanceMappingSpanListener",
        ));
        registry.register(
            DefaultListenerFactory::<ApplicationMappingSpanListener>::new(
                "applicationMappingSpanListener",
            ),
        );
        registry.register(DefaultListenerFactory::<ApplicationMetricSpanListener>::new(
            "applicationMetricSpanListener",
        ));
        registry.register(DefaultListenerFactory::<InstanceMetricSpanListener>::new(
            "instanceMetricSpanListener",
        ));
        registry.register(DefaultListenerFactory::<ServiceMetricSpanListener>::new(
            "serviceMetricSpanListener",
        ));
        registry.register(
            DefaultListenerFactory::<ServiceReferenceMetricSpanListener>::new(
                "serviceReferenceMetricSpanListener",
            ),
        );
        registry
    }

    pub fn register(&mut self, factory: impl SpanListenerFactory + 'static) {
        let label = format!("/segment/parse/createSpanListeners/{}", factory.name());
        self.factories.push((label, Box::new(factory)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// One new listener per registered factory, in registration order.
    #[must_use]
    pub fn create_listeners(&self) -> Vec<Box<dyn SpanListener>> {
        self.factories
            .iter()
            .map(|(label, factory)| self.metrics.time(label, || factory.create()))
            .collect()
    }
}

/// Starts every record in graph `graph_id`. Records the graph rejects are
/// dropped with a warning.
pub(crate) fn start_all<T>(graphs: &GraphRegistry, graph_id: GraphId, records: Vec<T>)
where
    T: AggregationRecord,
{
    if records.is_empty() {
        return;
    }
    let graph = match graphs.lookup::<T>(graph_id) {
        Ok(graph) => graph,
        Err(e) => {
            warn!("Dropping {} records: {e}", records.len());
            return;
        }
    };
    for record in records {
        debug!("Starting graph {graph_id} with record {}", record.id());
        if let Err(e) = graph.start(record) {
            warn!("Dropping record for graph {graph_id}: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::graph::test_support::{Collected, CollectingWorker};
    use crate::graph::Stage;
    use tokio_util::sync::CancellationToken;

    pub(crate) const START_TIME: i64 = 1_520_350_937_123;
    pub(crate) const BUCKET: i64 = 201_803_061_542;

    /// Registry with a single collecting graph for `T`.
    pub(crate) fn collecting_registry<T: AggregationRecord>(
        graph_id: GraphId,
        cancel: &CancellationToken,
    ) -> (GraphRegistry, Collected<T>) {
        let collected = Collected::default();
        let mut graphs = GraphRegistry::new();
        graphs
            .spawn(
                graph_id,
                Stage::new(CollectingWorker::new(1, collected.clone())),
                cancel,
            )
            .expect("spawn failed");
        (graphs, collected)
    }

    pub(crate) fn context() -> SegmentContext {
        SegmentContext {
            segment_id: "seg-1".to_string(),
            application_id: 2,
            application_instance_id: 7,
        }
    }

    pub(crate) fn span(span_type: SpanType, refs: Vec<ReferenceDecorator>) -> SpanDecorator {
        SpanDecorator {
            span_type,
            operation_name_id: 42,
            start_time: START_TIME,
            end_time: START_TIME + 20,
            refs,
            ..SpanDecorator::default()
        }
    }

    pub(crate) fn reference(network_address_id: i32) -> ReferenceDecorator {
        ReferenceDecorator {
            parent_application_id: 5,
            parent_application_instance_id: 9,
            network_address_id,
            parent_service_id: 17,
            entry_service_id: 17,
            parent_segment_id: "parent".to_string(),
        }
    }
}
