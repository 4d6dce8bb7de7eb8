// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use anyhow::Context;
use std::{env, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use apm_analysis::{
    config,
    listener::{Segment, SegmentParser},
    persistence::InMemoryStorage,
    pipeline::{MetricPipeline, PipelineOptions},
    remote::{ClusterView, HttpRemoteSender, RemoteReceiver},
};

use tokio_util::sync::CancellationToken;

const AGENT_HOST: &str = "0.0.0.0";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("APM_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    if let Err(e) = run().await {
        error!("Collector failed: {e:#}");
    }
}

async fn run() -> anyhow::Result<()> {
    let config = config::Config::new().context("error creating config on collector startup")?;

    let sender =
        HttpRemoteSender::new(config.remote_timeout()).context("error creating remote sender")?;
    let cluster = Arc::new(ClusterView::new(
        config.self_address.clone(),
        config.cluster_nodes.clone(),
    ));
    let mut options = PipelineOptions::new(cluster, Arc::new(sender));
    options.queue_size = config.worker_queue_size;
    options.remote_max_in_flight = config.remote_max_in_flight;
    options.selector = config.remote_selector;

    let storage = InMemoryStorage::new();
    let graphs_cancel = CancellationToken::new();
    let pipeline = MetricPipeline::build(&options, &storage, &graphs_cancel)
        .context("error building pipeline")?;

    let listener = TcpListener::bind((AGENT_HOST, config.remote_port))
        .await
        .with_context(|| format!("error binding remote receiver to port {}", config.remote_port))?;
    let receiver_cancel = CancellationToken::new();
    let receiver = RemoteReceiver::new(Arc::clone(pipeline.dispatcher()));
    let receiver_handle = tokio::spawn(receiver.serve(listener, receiver_cancel.clone()));
    info!("remote: starting to listen on port {}", config.remote_port);

    let timer_cancel = CancellationToken::new();
    let timer = pipeline.persistence_timer(config.flush_interval());
    let timer_handle = tokio::spawn(timer.run(timer_cancel.clone()));

    read_segments(&pipeline.segment_parser()).await;

    // stop intake first so every queued record reaches a persistence buffer
    // before the final flush
    graphs_cancel.cancel();
    pipeline.join().await;
    timer_cancel.cancel();
    timer_handle.await.context("persistence timer failed")?;
    receiver_cancel.cancel();
    receiver_handle
        .await
        .context("remote receiver task failed")?
        .context("remote receiver failed")?;

    for (label, sample) in pipeline.metrics().snapshot() {
        debug!(
            "{label}: {} calls, {:?} average",
            sample.calls,
            sample.average()
        );
    }
    info!("Collector stopped");
    Ok(())
}

/// Parses newline-delimited JSON segments from stdin until EOF or ctrl-c.
async fn read_segments(parser: &SegmentParser) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, shutting down");
                return;
            }
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<Segment>(&line) {
                Ok(segment) => {
                    parser.parse(segment);
                }
                Err(e) => warn!("Skipping undecodable segment: {e}"),
            },
            Ok(None) => {
                debug!("Segment input closed");
                return;
            }
            Err(e) => {
                error!("Error reading segments: {e}");
                return;
            }
        }
    }
}
