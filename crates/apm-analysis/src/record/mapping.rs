// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

use super::{compose_id, join_key, AggregationRecord};

/// An application observed calling another application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMapping {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub application_id: i32,
    pub mapping_application_id: i32,
}

impl ApplicationMapping {
    #[must_use]
    pub fn new(time_bucket: i64, application_id: i32, mapping_application_id: i32) -> Self {
        let metric_id = join_key(&[
            i64::from(application_id),
            i64::from(mapping_application_id),
        ]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            application_id,
            mapping_application_id,
        }
    }
}

impl AggregationRecord for ApplicationMapping {
    fn id(&self) -> &str {
        &self.id
    }

    fn metric_id(&self) -> &str {
        &self.metric_id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    // Mappings are deduplicated by id; there is nothing to add up.
    fn merge(&mut self, _other: &Self) {}

    fn with_time_bucket(&self, time_bucket: i64) -> Self {
        Self::new(time_bucket, self.application_id, self.mapping_application_id)
    }
}

/// An instance observed being reached through a network address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMapping {
    pub id: String,
    pub metric_id: String,
    pub time_bucket: i64,
    pub application_id: i32,
    pub instance_id: i32,
    pub address_id: i32,
}

impl InstanceMapping {
    #[must_use]
    pub fn new(time_bucket: i64, application_id: i32, instance_id: i32, address_id: i32) -> Self {
        let metric_id = join_key(&[i64::from(instance_id), i64::from(address_id)]);
        Self {
            id: compose_id(time_bucket, &metric_id),
            metric_id,
            time_bucket,
            application_id,
            instance_id,
            address_id,
        }
    }
}

impl AggregationRecord for InstanceMapping {
    fn id(&self) -> &str {
        &self.id
    }

    fn metric_id(&self) -> &str {
        &self.metric_id
    }

    fn time_bucket(&self) -> i64 {
        self.time_bucket
    }

    fn merge(&mut self, _other: &Self) {}

    fn with_time_bucket(&self, time_bucket: i64) -> Self {
        Self::new(
            time_bucket,
            self.application_id,
            self.instance_id,
            self.address_id,
        )
    }
}
