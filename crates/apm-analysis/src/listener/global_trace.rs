// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{start_all, Point, SegmentContext, SpanDecorator, SpanListener, UniqueId};
use crate::constants::GLOBAL_TRACE_GRAPH_ID;
use crate::errors::ListenerError;
use crate::graph::GraphRegistry;
use crate::record::GlobalTrace;

/// Correlates a segment with every global trace it belongs to.
#[derive(Debug, Default)]
pub struct GlobalTraceSpanListener {
    time_bucket: i64,
    segment_id: String,
    global_trace_ids: Vec<String>,
}

impl SpanListener for GlobalTraceSpanListener {
    fn points(&self) -> &'static [Point] {
        &[Point::First, Point::GlobalTraceIds]
    }

    fn parse_first(
        &mut self,
        span: &SpanDecorator,
        _segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        self.time_bucket = span.minute_time_bucket();
        Ok(())
    }

    fn parse_global_trace_id(
        &mut self,
        id: &UniqueId,
        segment: &SegmentContext,
    ) -> Result<(), ListenerError> {
        let global_trace_id = id.to_trace_id().ok_or_else(|| {
            ListenerError::Malformed(format!(
                "empty global trace id in segment {}",
                segment.segment_id
            ))
        })?;
        if self.segment_id.is_empty() {
            self.segment_id.clone_from(&segment.segment_id);
        }
        self.global_trace_ids.push(global_trace_id);
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        let Self {
            time_bucket,
            segment_id,
            global_trace_ids,
        } = *self;
        let records = global_trace_ids
            .iter()
            .map(|global_trace_id| GlobalTrace::new(&segment_id, global_trace_id, time_bucket))
            .collect();
        start_all(graphs, GLOBAL_TRACE_GRAPH_ID, records);
    }
}
