// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::graph::GraphId;

/// Separator between the parts of a composite record id.
pub const ID_SPLIT: &str = "_";

/// Slots in a worker's input queue unless configured otherwise.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Remote sends a remote worker keeps pending before it drops records.
pub const DEFAULT_REMOTE_MAX_IN_FLIGHT: usize = 256;

/// Service id standing in for the caller of an entry span with no reference.
pub const USER_SERVICE_ID: i32 = 1;

pub const APPLICATION_METRIC_GRAPH_ID: GraphId = 100;
pub const INSTANCE_METRIC_GRAPH_ID: GraphId = 200;
pub const SERVICE_METRIC_GRAPH_ID: GraphId = 300;
pub const SERVICE_REFERENCE_METRIC_GRAPH_ID: GraphId = 400;
pub const APPLICATION_MAPPING_GRAPH_ID: GraphId = 500;
pub const INSTANCE_MAPPING_GRAPH_ID: GraphId = 600;
pub const GLOBAL_TRACE_GRAPH_ID: GraphId = 700;

pub const APPLICATION_METRIC_TABLE: &str = "application_metric";
pub const INSTANCE_METRIC_TABLE: &str = "instance_metric";
pub const SERVICE_METRIC_TABLE: &str = "service_metric";
pub const SERVICE_REFERENCE_METRIC_TABLE: &str = "service_reference_metric";
pub const APPLICATION_MAPPING_TABLE: &str = "application_mapping";
pub const INSTANCE_MAPPING_TABLE: &str = "instance_mapping";
pub const GLOBAL_TRACE_TABLE: &str = "global_trace";
