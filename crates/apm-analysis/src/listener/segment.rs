// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoded trace segments as handed to the parser.

use serde::{Deserialize, Serialize};

use crate::record::Observation;
use crate::time_bucket::minute_bucket;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanType {
    #[default]
    Entry,
    Exit,
    Local,
}

impl SpanType {
    /// Numeric code stored as a metric's `source_value`.
    #[must_use]
    pub fn value(self) -> i32 {
        match self {
            SpanType::Entry => 0,
            SpanType::Exit => 1,
            SpanType::Local => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpanLayer {
    #[default]
    Unknown,
    Database,
    RpcFramework,
    Http,
    #[serde(rename = "MQ")]
    Mq,
    Cache,
}

/// A global trace id split into its numeric parts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueId {
    pub id_parts: Vec<i64>,
}

impl UniqueId {
    #[must_use]
    pub fn new(id_parts: Vec<i64>) -> Self {
        Self { id_parts }
    }

    /// Parts joined with `.`, or `None` when there are no parts.
    #[must_use]
    pub fn to_trace_id(&self) -> Option<String> {
        if self.id_parts.is_empty() {
            return None;
        }
        Some(
            self.id_parts
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join("."),
        )
    }
}

/// Link from a span to the segment that called it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceDecorator {
    pub parent_application_id: i32,
    pub parent_application_instance_id: i32,
    pub network_address_id: i32,
    pub parent_service_id: i32,
    pub entry_service_id: i32,
    pub parent_segment_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanDecorator {
    pub span_id: i32,
    pub parent_span_id: i32,
    pub span_type: SpanType,
    pub span_layer: SpanLayer,
    /// Service id of the operation.
    pub operation_name_id: i32,
    pub peer_id: i32,
    pub component_id: i32,
    pub start_time: i64,
    pub end_time: i64,
    pub is_error: bool,
    pub refs: Vec<ReferenceDecorator>,
    /// Zero until computed from `start_time`.
    pub start_time_minute_time_bucket: i64,
}

impl SpanDecorator {
    /// Minute bucket of `start_time`, computed when not set yet.
    #[must_use]
    pub fn minute_time_bucket(&self) -> i64 {
        if self.start_time_minute_time_bucket == 0 {
            minute_bucket(self.start_time)
        } else {
            self.start_time_minute_time_bucket
        }
    }

    pub(crate) fn fill_minute_time_bucket(&mut self) {
        self.start_time_minute_time_bucket = self.minute_time_bucket();
    }

    /// Elapsed milliseconds. A span ending before it starts counts as zero.
    #[must_use]
    pub fn duration(&self) -> u64 {
        u64::try_from(self.end_time.saturating_sub(self.start_time)).unwrap_or(0)
    }

    #[must_use]
    pub fn observation(&self) -> Observation {
        Observation {
            duration: self.duration(),
            is_error: self.is_error,
            is_entry: self.span_type == SpanType::Entry,
            is_mq: self.span_layer == SpanLayer::Mq,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Segment {
    pub segment_id: String,
    pub application_id: i32,
    pub application_instance_id: i32,
    pub global_trace_ids: Vec<UniqueId>,
    pub spans: Vec<SpanDecorator>,
}
