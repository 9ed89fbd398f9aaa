// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;

use error_dispatch::{decoder::SubscriptionEvent, logger::Formatter, DispatchConfig, Pipeline};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Serialize)]
struct InvocationSummary {
    records: usize,
    eligible: usize,
    dispatched: usize,
}

#[tokio::main]
pub async fn main() -> Result<(), Error> {
    let config = DispatchConfig::from_env();

    // Diagnostics for a rejected configuration still go out at the default level.
    let log_level = config
        .as_ref()
        .map(|c| c.log_level.as_str())
        .unwrap_or(DEFAULT_LOG_LEVEL);

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(env_filter(log_level)))
        .without_time()
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Error loading dispatch configuration: {e}");
            return Err(e.into());
        }
    };
    info!(
        "Dispatching errors to {}/{} as {}",
        config.owner, config.repo, config.event_type
    );

    let pipeline = Arc::new(Pipeline::from_config(&config));

    lambda_runtime::run(service_fn(|event: LambdaEvent<SubscriptionEvent>| {
        let pipeline = Arc::clone(&pipeline);
        async move { handle(&pipeline, event).await }
    }))
    .await
}

async fn handle(
    pipeline: &Pipeline,
    event: LambdaEvent<SubscriptionEvent>,
) -> Result<InvocationSummary, Error> {
    let (payload, context) = event.into_parts();
    let deadline = Instant::now() + remaining_time(context.deadline);
    let span = info_span!("invocation", request_id = %context.request_id);

    let report = pipeline
        .handle(&payload, Some(deadline))
        .instrument(span)
        .await?;

    debug!(
        "Invocation of {}/{} completed as {:?}",
        report.source_id, report.stream_id, report.completion
    );
    Ok(InvocationSummary {
        records: report.records,
        eligible: report.eligible,
        dispatched: report.succeeded(),
    })
}

fn env_filter(log_level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,{log_level}")
}

/// Time left until the invocation deadline, given in milliseconds since the epoch.
fn remaining_time(deadline_ms: u64) -> Duration {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();
    Duration::from_millis(deadline_ms.saturating_sub(now_ms))
}
