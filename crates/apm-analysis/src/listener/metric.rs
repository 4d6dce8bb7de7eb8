// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{start_all, Point, SegmentContext, SpanDecorator, SpanListener};
use crate::constants::{APPLICATION_METRIC_GRAPH_ID, INSTANCE_METRIC_GRAPH_ID};
use crate::errors::ListenerError;
use crate::graph::GraphRegistry;
use crate::record::{ApplicationMetric, InstanceMetric, MetricCounters};

/// Counts one transaction per segment against the segment's application.
#[derive(Debug, Default)]
pub struct ApplicationMetricSpanListener {
    metric: Option<ApplicationMetric>,
}

impl SpanListener for ApplicationMetricSpanListener {
    fn points(&self) -> &'static [Point] {
        &[Point::First]
    }

    fn parse_first(
        &mut self,
        span: &SpanDecorator,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        self.metric = Some(ApplicationMetric::new(
            span.minute_time_bucket(),
            segment.application_id,
            span.span_type.value(),
            MetricCounters::observed(span.observation()),
        ));
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        start_all(
            graphs,
            APPLICATION_METRIC_GRAPH_ID,
            self.metric.into_iter().collect(),
        );
    }
}

/// Counts one transaction per segment against the reporting instance.
#[derive(Debug, Default)]
pub struct InstanceMetricSpanListener {
    metric: Option<InstanceMetric>,
}

impl SpanListener for InstanceMetricSpanListener {
    fn points(&self) -> &'static [Point] {
        &[Point::First]
    }

    fn parse_first(
        &mut self,
        span: &SpanDecorator,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        if segment.application_instance_id == 0 {
            return Err(ListenerError::Malformed(format!(
                "segment {} has no application instance",
                segment.segment_id
            )));
        }
        self.metric = Some(InstanceMetric::new(
            span.minute_time_bucket(),
            segment.application_id,
            segment.application_instance_id,
            span.span_type.value(),
            MetricCounters::observed(span.observation()),
        ));
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        start_all(
            graphs,
            INSTANCE_METRIC_GRAPH_ID,
            self.metric.into_iter().collect(),
        );
    }
}
