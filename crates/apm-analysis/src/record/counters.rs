// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// One span's contribution to a [`MetricCounters`] block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    pub duration: u64,
    pub is_error: bool,
    /// Entry spans count as business transactions.
    pub is_entry: bool,
    pub is_mq: bool,
}

/// Additive counters shared by every metric record kind.
///
/// `min_duration` uses 0 for "nothing observed yet" so that the empty block is
/// the identity of [`MetricCounters::merge`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCounters {
    pub transaction_calls: u64,
    pub transaction_error_calls: u64,
    pub transaction_duration_sum: u64,
    pub transaction_error_duration_sum: u64,
    pub business_transaction_calls: u64,
    pub business_transaction_error_calls: u64,
    pub business_transaction_duration_sum: u64,
    pub business_transaction_error_duration_sum: u64,
    pub mq_transaction_calls: u64,
    pub mq_transaction_error_calls: u64,
    pub mq_transaction_duration_sum: u64,
    pub mq_transaction_error_duration_sum: u64,
    pub min_duration: u64,
    pub max_duration: u64,
}

impl MetricCounters {
    #[must_use]
    pub fn observed(observation: Observation) -> Self {
        let mut counters = Self::default();
        counters.observe(observation);
        counters
    }

    pub fn observe(&mut self, observation: Observation) {
        let Observation {
            duration,
            is_error,
            is_entry,
            is_mq,
        } = observation;
        let error_calls = u64::from(is_error);
        let error_duration = if is_error { duration } else { 0 };

        self.transaction_calls += 1;
        self.transaction_error_calls += error_calls;
        self.transaction_duration_sum += duration;
        self.transaction_error_duration_sum += error_duration;
        if is_entry {
            self.business_transaction_calls += 1;
            self.business_transaction_error_calls += error_calls;
            self.business_transaction_duration_sum += duration;
            self.business_transaction_error_duration_sum += error_duration;
        }
        if is_mq {
            self.mq_transaction_calls += 1;
            self.mq_transaction_error_calls += error_calls;
            self.mq_transaction_duration_sum += duration;
            self.mq_transaction_error_duration_sum += error_duration;
        }
        self.min_duration = min_nonzero(self.min_duration, duration);
        self.max_duration = self.max_duration.max(duration);
    }

    pub fn merge(&mut self, other: &Self) {
        self.transaction_calls += other.transaction_calls;
        self.transaction_error_calls += other.transaction_error_calls;
        self.transaction_duration_sum += other.transaction_duration_sum;
        self.transaction_error_duration_sum += other.transaction_error_duration_sum;
        self.business_transaction_calls += other.business_transaction_calls;
        self.business_transaction_error_calls += other.business_transaction_error_calls;
        self.business_transaction_duration_sum += other.business_transaction_duration_sum;
        self.business_transaction_error_duration_sum +=
            other.business_transaction_error_duration_sum;
        self.mq_transaction_calls += other.mq_transaction_calls;
        self.mq_transaction_error_calls += other.mq_transaction_error_calls;
        self.mq_transaction_duration_sum += other.mq_transaction_duration_sum;
        self.mq_transaction_error_duration_sum += other.mq_transaction_error_duration_sum;
        self.min_duration = min_nonzero(self.min_duration, other.min_duration);
        self.max_duration = self.max_duration.max(other.max_duration);
    }
}

fn min_nonzero(a: u64, b: u64) -> u64 {
    match (a, b) {
        (0, other) | (other, 0) => other,
        (a, b) => a.min(b),
    }
}
