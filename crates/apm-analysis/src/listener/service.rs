// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{start_all, Point, SegmentContext, SpanDecorator, SpanListener};
use crate::constants::{
    SERVICE_METRIC_GRAPH_ID, SERVICE_REFERENCE_METRIC_GRAPH_ID, USER_SERVICE_ID,
};
use crate::errors::ListenerError;
use crate::graph::GraphRegistry;
use crate::record::{MetricCounters, ServiceMetric, ServiceReferenceMetric};

struct ServiceCall {
    service_id: i32,
    source_value: i32,
    counters: MetricCounters,
}

/// Counts calls to every service a segment enters through.
#[derive(Default)]
pub struct ServiceMetricSpanListener {
    time_bucket: i64,
    application_id: i32,
    instance_id: i32,
    calls: Vec<ServiceCall>,
}

impl SpanListener for ServiceMetricSpanListener {
    fn points(&self) -> &'static [Point] {
        &[Point::First, Point::Entry]
    }

    fn parse_first(
        &mut self,
        span: &SpanDecorator,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        self.time_bucket = span.minute_time_bucket();
        self.application_id = segment.application_id;
        self.instance_id = segment.application_instance_id;
        Ok(())
    }

    fn parse_entry(
        &mut self,
        span: &SpanDecorator,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        if span.operation_name_id == 0 {
            return Err(ListenerError::Malformed(format!(
                "entry span {} of segment {} has no service",
                span.span_id, segment.segment_id
            )));
        }
        self.calls.push(ServiceCall {
            service_id: span.operation_name_id,
            source_value: span.span_type.value(),
            counters: MetricCounters::observed(span.observation()),
        });
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        let Self {
            time_bucket,
            application_id,
            instance_id,
            calls,
        } = *self;
        let records = calls
            .into_iter()
            .map(|call| {
                ServiceMetric::new(
                    time_bucket,
                    application_id,
                    instance_id,
                    call.service_id,
                    call.source_value,
                    call.counters,
                )
            })
            .collect();
        start_all(graphs, SERVICE_METRIC_GRAPH_ID, records);
    }
}

struct ServiceReference {
    front_service_id: i32,
    behind_service_id: i32,
    source_value: i32,
    counters: MetricCounters,
}

/// Counts calls between services.
///
/// Every reference of an entry span yields a call from the reference's parent
/// service to the entry span's service. An entry span without references was
/// called by a user, represented by [`USER_SERVICE_ID`].
#[derive(Default)]
pub struct ServiceReferenceMetricSpanListener {
    time_bucket: i64,
    references: Vec<ServiceReference>,
}

impl SpanListener for ServiceReferenceMetricSpanListener {
    fn points(&self) -> &'static [Point] {
        &[Point::First, Point::Entry]
    }

    fn parse_first(
        &mut self,
        span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        self.time_bucket = span.minute_time_bucket();
        Ok(())
    }

    fn parse_entry(
        &mut self,
        span: &SpanDecorator,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        let counters = MetricCounters::observed(span.observation());
        let source_value = span.span_type.value();
        if span.refs.is_empty() {
            self.references.push(ServiceReference {
                front_service_id: USER_SERVICE_ID,
                behind_service_id: span.operation_name_id,
                source_value,
                counters,
            });
            return Ok(());
        }

        let mut malformed = 0;
        for reference in &span.refs {
            if reference.parent_service_id == 0 {
                malformed += 1;
                continue;
            }
            self.references.push(ServiceReference {
                front_service_id: reference.parent_service_id,
                behind_service_id: span.operation_name_id,
                source_value,
                counters,
            });
        }
        if malformed > 0 {
            return Err(ListenerError::Malformed(format!(
                "{malformed} references without parent service in segment {}",
                segment.segment_id
            )));
        }
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        let time_bucket = self.time_bucket;
        let records = self
            .references
            .into_iter()
            .map(|reference| {
                ServiceReferenceMetric::new(
                    time_bucket,
                    reference.front_service_id,
                    reference.behind_service_id,
                    reference.source_value,
                    reference.counters,
                )
            })
            .collect();
        start_all(graphs, SERVICE_REFERENCE_METRIC_GRAPH_ID, records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::test_support::{collecting_registry, context, reference, span, BUCKET};
    use crate::listener::SpanType;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_service_metric_per_entry_span() {
        let cancel = CancellationToken::new();
        let (graphs, collected) =
            collecting_registry::<ServiceMetric>(SERVICE_METRIC_GRAPH_ID, &cancel);
        let segment = context();
        let entry = span(SpanType::Entry, Vec::new());

        let mut listener = Box::<ServiceMetricSpanListener>::default();
        listener.parse_first(&entry, &segment).unwrap();
        listener.parse_entry(&entry, &segment).unwrap();
        let mut anonymous = entry.clone();
        anonymous.operation_name_id = 0;
        assert!(listener.parse_entry(&anonymous, &segment).is_err());
        listener.build(&graphs);

        cancel.cancel();
        graphs.join().await;
        let records = collected.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, format!("{BUCKET}_42_0"));
        assert_eq!(records[0].instance_id, 7);
    }

    #[tokio::test]
    async fn test_service_reference_from_parent_and_user() {
        let cancel = CancellationToken::new();
        let (graphs, collected) = collecting_registry::<ServiceReferenceMetric>(
            SERVICE_REFERENCE_METRIC_GRAPH_ID,
            &cancel,
        );
        let segment = context();
        let called = span(SpanType::Entry, vec![reference(3)]);
        let from_user = span(SpanType::Entry, Vec::new());

        let mut listener = Box::<ServiceReferenceMetricSpanListener>::default();
        listener.parse_first(&called, &segment).unwrap();
        listener.parse_entry(&called, &segment).unwrap();
        listener.parse_entry(&from_user, &segment).unwrap();
        listener.build(&graphs);

        cancel.cancel();
        graphs.join().await;
        let ids: Vec<_> = collected.records().into_iter().map(|r| r.id).collect();
        assert_eq!(
            ids,
            vec![format!("{BUCKET}_17_42_0"), format!("{BUCKET}_1_42_0")]
        );
    }
}
