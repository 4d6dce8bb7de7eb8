// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::{start_all, Point, SegmentContext, SpanDecorator, SpanListener};
use crate::constants::{APPLICATION_MAPPING_GRAPH_ID, INSTANCE_MAPPING_GRAPH_ID};
use crate::errors::ListenerError;
use crate::graph::GraphRegistry;
use crate::record::{ApplicationMapping, InstanceMapping};

/// Records which network address each caller reached this instance through.
#[derive(Debug, Default)]
pub struct InstanceMappingSpanListener {
    time_bucket: i64,
    // (application, instance, address)
    mappings: Vec<(i32, i32, i32)>,
}

impl SpanListener for InstanceMappingSpanListener {
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
        let mut malformed = 0;
        for reference in &span.refs {
            if reference.network_address_id == 0 {
                malformed += 1;
                continue;
            }
            self.mappings.push((
                segment.application_id,
                segment.application_instance_id,
                reference.network_address_id,
            ));
        }
        if malformed > 0 {
            return Err(ListenerError::Malformed(format!(
                "{malformed} references without network address in segment {}",
                segment.segment_id
            )));
        }
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        let time_bucket = self.time_bucket;
        let records = self
            .mappings
            .into_iter()
            .map(|(application_id, instance_id, address_id)| {
                InstanceMapping::new(time_bucket, application_id, instance_id, address_id)
            })
            .collect();
        start_all(graphs, INSTANCE_MAPPING_GRAPH_ID, records);
    }
}

/// Records which applications call this segment's application.
#[derive(Debug, Default)]
pub struct ApplicationMappingSpanListener {
    time_bucket: i64,
    mappings: Vec<(i32, i32)>,
}

impl SpanListener for ApplicationMappingSpanListener {
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
        let mut malformed = 0;
        for reference in &span.refs {
            if reference.parent_application_id == 0 {
                malformed += 1;
                continue;
            }
            self.mappings
                .push((segment.application_id, reference.parent_application_id));
        }
        if malformed > 0 {
            return Err(ListenerError::Malformed(format!(
                "{malformed} references without parent application in segment {}",
                segment.segment_id
            )));
        }
        Ok(())
    }

    fn build(self: Box<Self>, graphs: &GraphRegistry) {
        let time_bucket = self.time_bucket;
        let records = self
            .mappings
            .into_iter()
            .map(|(application_id, mapping_application_id)| {
                ApplicationMapping::new(time_bucket, application_id, mapping_application_id)
            })
            .collect();
        start_all(graphs, APPLICATION_MAPPING_GRAPH_ID, records);
    }
}
