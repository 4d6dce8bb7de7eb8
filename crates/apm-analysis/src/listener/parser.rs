// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use super::{ListenerRegistry, Point, Segment, SegmentContext, SpanListener, SpanType};
use crate::errors::ListenerError;
use crate::graph::GraphRegistry;
use crate::instrument::ComputingMetrics;

const PARSE_METRIC: &str = "/segment/parse";

/// Drives the listeners over one segment at a time.
pub struct SegmentParser {
    listeners: ListenerRegistry,
    graphs: Arc<GraphRegistry>,
    metrics: Arc<ComputingMetrics>,
}

impl SegmentParser {
    #[must_use]
    pub fn new(
        listeners: ListenerRegistry,
        graphs: Arc<GraphRegistry>,
        metrics: Arc<ComputingMetrics>,
    ) -> Self {
        Self {
            listeners,
            graphs,
            metrics,
        }
    }

    /// Feeds `segment` to a fresh listener set and builds their records.
    ///
    /// Returns `false` when the segment has no spans and nothing was built.
    pub fn parse(&self, mut segment: Segment) -> bool {
        let Some(first) = segment.spans.first_mut() else {
            debug!("Segment {} has no spans", segment.segment_id);
            return false;
        };
        let start = Instant::now();
        first.fill_minute_time_bucket();

        let context = SegmentContext::from(&segment);
        let mut listeners = self.listeners.create_listeners();

        if let Some(first) = segment.spans.first() {
            notify(&mut listeners, Point::First, &context, |listener| {
                listener.parse_first(first, &context)
            });
        }
        for span in &segment.spans {
            let point = match span.span_type {
                SpanType::Entry => Point::Entry,
                SpanType::Exit => Point::Exit,
                SpanType::Local => Point::Local,
            };
            notify(&mut listeners, point, &context, |listener| match point {
                Point::Entry => listener.parse_entry(span, &context),
                Point::Exit => listener.parse_exit(span, &context),
                _ => listener.parse_local(span, &context),
            });
        }
        for id in &segment.global_trace_ids {
            notify(&mut listeners, Point::GlobalTraceIds, &context, |listener| {
                listener.parse_global_trace_id(id, &context)
            });
        }

        for listener in listeners {
            listener.build(&self.graphs);
        }
        self.metrics.record(PARSE_METRIC, start.elapsed());
        true
    }
}

fn notify<F>(
    listeners: &mut [Box<dyn SpanListener>],
    point: Point,
    context: &SegmentContext,
    mut parse: F,
) where
    F: FnMut(&mut dyn SpanListener) -> Result<(), ListenerError>,
{
    for listener in listeners
        .iter_mut()
        .filter(|listener| listener.contains_point(point))
    {
        if let Err(e) = parse(listener.as_mut()) {
            warn!("Skipping {point:?} of segment {}: {e}", context.segment_id);
        }
    }
}
