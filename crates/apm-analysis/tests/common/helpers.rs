// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use apm_analysis::listener::{ReferenceDecorator, Segment, SpanDecorator, SpanType, UniqueId};

/// 2018-03-06T15:42:17.123Z
pub const START_TIME: i64 = 1_520_350_937_123;
pub const MINUTE_BUCKET: i64 = 201_803_061_542;

pub const APPLICATION_ID: i32 = 2;
pub const INSTANCE_ID: i32 = 7;
pub const ADDRESS_ID: i32 = 3;
pub const SERVICE_ID: i32 = 42;

/// A segment entering instance 7 from address 3, part of one global trace.
pub fn entry_segment(segment_id: &str, trace_id: i64) -> Segment {
    Segment {
        segment_id: segment_id.to_string(),
        application_id: APPLICATION_ID,
        application_instance_id: INSTANCE_ID,
        global_trace_ids: vec![UniqueId::new(vec![11, 22, trace_id])],
        spans: vec![
            SpanDecorator {
                span_id: 0,
                parent_span_id: -1,
                span_type: SpanType::Entry,
                operation_name_id: SERVICE_ID,
                start_time: START_TIME,
                end_time: START_TIME + 25,
                refs: vec![ReferenceDecorator {
                    parent_application_id: 5,
                    parent_application_instance_id: 9,
                    network_address_id: ADDRESS_ID,
                    parent_service_id: 17,
                    entry_service_id: 17,
                    parent_segment_id: "parent".to_string(),
                }],
                ..SpanDecorator::default()
            },
            SpanDecorator {
                span_id: 1,
                parent_span_id: 0,
                span_type: SpanType::Exit,
                operation_name_id: 43,
                start_time: START_TIME + 5,
                end_time: START_TIME + 20,
                ..SpanDecorator::default()
            },
        ],
    }
}

/// Polls `condition` every 20ms until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let check = async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(timeout, check).await.is_ok()
}
