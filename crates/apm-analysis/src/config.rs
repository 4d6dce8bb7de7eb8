// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{DEFAULT_QUEUE_SIZE, DEFAULT_REMOTE_MAX_IN_FLIGHT};
use crate::errors::ConfigError;
use crate::remote::{parse_node_list, RemoteNode};
use crate::selector::SelectorKind;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 3;
const DEFAULT_REMOTE_PORT: u16 = 11800;
const DEFAULT_SELF_ADDRESS: &str = "127.0.0.1:11800";
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    /// slots in every worker's input queue
    pub worker_queue_size: usize,
    /// how often persistence buffers are flushed, in seconds
    pub persistence_flush_interval_secs: u64,
    /// port the remote receiver listens on
    pub remote_port: u16,
    /// address other collectors reach this one at, as listed in `cluster_nodes`
    pub self_address: String,
    pub cluster_nodes: Vec<RemoteNode>,
    /// timeout for each remote send, in milliseconds
    pub remote_timeout_ms: u64,
    /// remote sends each remote worker keeps pending before dropping records
    pub remote_max_in_flight: usize,
    pub remote_selector: SelectorKind,
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let log_level =
            env::var("APM_LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let worker_queue_size: usize = env::var("APM_WORKER_QUEUE_SIZE")
            .ok()
            .and_then(|size| size.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_QUEUE_SIZE);
        let persistence_flush_interval_secs: u64 = env::var("APM_PERSISTENCE_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|secs| secs.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
        let remote_port: u16 = env::var("APM_REMOTE_PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(DEFAULT_REMOTE_PORT);
        let remote_timeout_ms: u64 = env::var("APM_REMOTE_TIMEOUT_MS")
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_MS);
        let remote_max_in_flight: usize = env::var("APM_REMOTE_MAX_IN_FLIGHT")
            .ok()
            .and_then(|max| max.parse::<usize>().ok())
            .filter(|max| *max > 0)
            .unwrap_or(DEFAULT_REMOTE_MAX_IN_FLIGHT);

        let self_address =
            env::var("APM_SELF_ADDRESS").unwrap_or_else(|_| DEFAULT_SELF_ADDRESS.to_string());
        if parse_node_list(&self_address)?.len() != 1 {
            return Err(ConfigError::InvalidValue {
                name: "APM_SELF_ADDRESS",
                value: self_address,
            });
        }

        // the cluster is just this collector unless told otherwise
        let cluster_nodes = match env::var("APM_CLUSTER_NODES") {
            Ok(nodes) if !nodes.trim().is_empty() => parse_node_list(&nodes)?,
            _ => vec![RemoteNode::new(self_address.clone())],
        };

        let remote_selector = match env::var("APM_REMOTE_SELECTOR") {
            Ok(selector) => selector.parse::<SelectorKind>()?,
            Err(_) => SelectorKind::default(),
        };

        Ok(Config {
            log_level,
            worker_queue_size,
            persistence_flush_interval_secs,
            remote_port,
            self_address,
            cluster_nodes,
            remote_timeout_ms,
            remote_max_in_flight,
            remote_selector,
        })
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.persistence_flush_interval_secs)
    }

    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}
