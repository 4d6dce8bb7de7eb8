// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::AggregationRecord;
use crate::constants::ID_SPLIT;

/// Correlates a segment with one global trace id it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalTrace {
    pub id: String,
    pub segment_id: String,
    pub global_trace_id: String,
    pub time_bucket: i64,
}

impl GlobalTrace {
    #[must_use]
    pub fn new(segment_id: &str, global_trace_id: &str, time_bucket: i64) -> Self {
        Self {
            id: format!("{segment_id}{ID_SPLIT}{global_trace_id}"),
            segment_id: segment_id.to_string(),
            global_trace_id: global_trace_id.to_string(),
            time_bucket,
        }
    }
}

impl AggregationRecord for GlobalTrace {
    fn id(&self) -> &str {
        &self.id
    }

    fn metric_id(&self) -> &str {
        &self.global_trace_id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    fn merge(&mut self, _other: &Self) {}

    // The id does not carry the bucket.
    fn with_time_bucket(&self, time_bucket: i64) -> Self {
        Self {
            time_bucket,
            ..self.clone()
        }
    }
}
