// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Aggregation records.
//!
//! Every record kind is keyed by a deterministic `id`, normally
//! `time_bucket + "_" + metric_id`. Two records with the same id describe the
//! same entity in the same time window and can be folded together with
//! [`AggregationRecord::merge`]. Merging is commutative and associative:
//! counters add, extremal fields take min/max, and mapping records carry no
//! numbers at all so merging them is a no-op.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use crate::constants::ID_SPLIT;

mod counters;
mod global_trace;
mod mapping;
mod metric;

pub use counters::{MetricCounters, Observation};
pub use global_trace::GlobalTrace;
pub use mapping::{ApplicationMapping, InstanceMapping};
pub use metric::{ApplicationMetric, InstanceMetric, ServiceMetric, ServiceReferenceMetric};

pub trait AggregationRecord:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    fn id(&self) -> &str;

    /// Entity key without the time bucket.
    fn metric_id(&self) -> &str;

    fn time_bucket(&self) -> i64;

    /// Folds `other` into `self`. Callers only merge records sharing an id.
    fn merge(&mut self, other: &Self);

    /// Copy of this record placed in `time_bucket`, with the id re-derived.
    #[must_use]
    fn with_time_bucket(&self, time_bucket: i64) -> Self;
}

#[must_use]
pub fn compose_id(time_bucket: i64, metric_id: &str) -> String {
    format!("{time_bucket}{ID_SPLIT}{metric_id}")
}

pub(crate) fn join_key(parts: &[i64]) -> String {
    parts
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(ID_SPLIT)
}
