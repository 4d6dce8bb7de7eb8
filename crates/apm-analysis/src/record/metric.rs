// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{compose_id, join_key, AggregationRecord, MetricCounters};

macro_rules! impl_metric_record {
    ($record:ty) => {
        impl AggregationRecord for $record {
            fn id(&self) -> &str {
                &self.id
            }

            fn metric_id(&self) -> &str {
                &self.metric_id
            }

            fn time_bucket(&self) -> i64 {
                self.time_bucket
            }

            fn merge(&mut self, other: &Self) {
                self.counters.merge(&other.counters);
            }

            fn with_time_bucket(&self, time_bucket: i64) -> Self {
                let mut record = self.clone();
                record.id = compose_id(time_bucket, &record.metric_id);
                record.time_bucket = time_bucket;
                record
            }
        }
    };
}

/// Per-application transaction counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMetric {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub application_id: i32,
    /// Span type that produced the observation.
    pub source_value: i32,
    pub counters: MetricCounters,
}

impl ApplicationMetric {
    #[must_use]
    pub fn new(
        time_bucket: i64,
        application_id: i32,
        source_value: i32,
        counters: MetricCounters,
    ) -> Self {
        let metric_id = join_key(&[i64::from(application_id), i64::from(source_value)]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            application_id,
            source_value,
            counters,
        }
    }
}

impl_metric_record!(ApplicationMetric);

/// Per-instance transaction counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetric {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub application_id: i32,
    pub instance_id: i32,
    pub source_value: i32,
    pub counters: MetricCounters,
}

impl InstanceMetric {
    #[must_use]
    pub fn new(
        time_bucket: i64,
        application_id: i32,
        instance_id: i32,
        source_value: i32,
        counters: MetricCounters,
    ) -> Self {
        let metric_id = join_key(&[i64::from(instance_id), i64::from(source_value)]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            application_id,
            instance_id,
            source_value,
            counters,
        }
    }
}

impl_metric_record!(InstanceMetric);

/// Per-service (entry operation) counters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetric {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub application_id: i32,
    pub instance_id: i32,
    pub service_id: i32,
    pub source_value: i32,
    pub counters: MetricCounters,
}

impl ServiceMetric {
    #[must_use]
    pub fn new(
        time_bucket: i64,
        application_id: i32,
        instance_id: i32,
        service_id: i32,
        source_value: i32,
        counters: MetricCounters,
    ) -> Self {
        let metric_id = join_key(&[i64::from(service_id), i64::from(source_value)]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            application_id,
            instance_id,
            service_id,
            source_value,
            counters,
        }
    }
}

impl_metric_record!(ServiceMetric);

/// Counters of calls from one service to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReferenceMetric {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub front_service_id: i32,
    pub behind_service_id: i32,
    pub source_value: i32,
    pub counters: MetricCounters,
}

impl ServiceReferenceMetric {
    #[must_use]
    pub fn new(
        time_bucket: i64,
        front_service_id: i32,
        behind_service_id: i32,
        source_value: i32,
        counters: MetricCounters,
    ) -> Self {
        let metric_id = join_key(&[
            i64::from(front_service_id),
            i64::from(behind_service_id),
            i64::from(source_value),
        ]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            front_service_id,
            behind_service_id,
            source_value,
            counters,
        }
    }
}

impl_metric_record!(ServiceReferenceMetric);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Observation;

    fn counters(duration: u64, is_error: bool) -> MetricCounters {
        MetricCounters::observed(Observation {
            duration,
            is_error,
            ..Observation::default()
        })
    }

    #[test]
    fn test_ids() {
        let metric = ServiceReferenceMetric::new(201_803_061_542, 1, 12, 0, counters(3, false));
        assert_eq!(metric.metric_id, "1_12_0");
        assert_eq!(metric.id(), "201803061542_1_12_0");

        let metric = InstanceMetric::new(201_803_061_542, 2, 7, 0, counters(3, false));
        assert_eq!(metric.id(), "201803061542_7_0");
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = ApplicationMetric::new(201_803_061_542, 2, 0, counters(10, false));
        let b = ApplicationMetric::new(201_803_061_542, 2, 0, counters(30, true));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.counters.transaction_calls, 2);
        assert_eq!(ab.counters.transaction_error_calls, 1);
        assert_eq!(ab.counters.transaction_duration_sum, 40);
    }

    #[test]
    fn test_with_time_bucket_rederives_id() {
        let minute = ServiceMetric::new(201_803_061_542, 2, 7, 12, 0, counters(10, false));
        let hour = minute.with_time_bucket(2_018_030_615);
        assert_eq!(hour.id(), "2018030615_12_0");
        assert_eq!(hour.time_bucket(), 2_018_030_615);
        assert_eq!(hour.counters, minute.counters);
        assert_eq!(minute.id(), "201803061542_12_0");
    }
}
