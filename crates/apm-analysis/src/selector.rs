// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Routing policies choosing which cluster node aggregates a record.
//!
//! [`HashCodeSelector`] is the policy used for metrics: every record with the
//! same id lands on the same node for a given node list, which is what lets
//! the destination merge them in memory. The hash is FNV-1a so the choice is
//! the same in every process of the cluster.

use std::hash::Hasher;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::remote::RemoteNode;

pub trait Selector: Send + Sync {
    /// Picks one of `nodes` for the record identified by `record_id`.
    /// Returns `None` only when `nodes` is empty.
    fn select<'a>(&self, nodes: &'a [RemoteNode], record_id: &str) -> Option<&'a RemoteNode>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HashCodeSelector;

impl Selector for HashCodeSelector {
    fn select<'a>(&self, nodes: &'a [RemoteNode], record_id: &str) -> Option<&'a RemoteNode> {
        if nodes.is_empty() {
            return None;
        }
        let mut hasher = FnvHasher::default();
        hasher.write(record_id.as_bytes());
        let index = hasher.finish() % nodes.len() as u64;
        nodes.get(usize::try_from(index).ok()?)
    }
}

/// Round robin over the candidate nodes.
#[derive(Debug, Default)]
pub struct RollingSelector {
    cursor: AtomicUsize,
}

impl Selector for RollingSelector {
    fn select<'a>(&self, nodes: &'a [RemoteNode], _record_id: &str) -> Option<&'a RemoteNode> {
        if nodes.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % nodes.len();
        nodes.get(index)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ForeverFirstSelector;

impl Selector for ForeverFirstSelector {
    fn select<'a>(&self, nodes: &'a [RemoteNode], _record_id: &str) -> Option<&'a RemoteNode> {
        nodes.first()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    Hash,
    Rolling,
    First,
}

impl SelectorKind {
    #[must_use]
    pub fn build(self) -> Arc<dyn Selector> {
        match self {
            SelectorKind::Hash => Arc::new(HashCodeSelector),
            SelectorKind::Rolling => Arc::new(RollingSelector::default()),
            SelectorKind::First => Arc::new(ForeverFirstSelector),
        }
    }
}

impl FromStr for SelectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hash" | "hashcode" => Ok(SelectorKind::Hash),
            "rolling" => Ok(SelectorKind::Rolling),
            "first" | "foreverfirst" => Ok(SelectorKind::First),
            _ => Err(ConfigError::InvalidValue {
                name: "APM_REMOTE_SELECTOR",
                value: s.to_string(),
            }),
        }
    }
}
