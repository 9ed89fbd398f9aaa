// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of dispatch payloads to the automation endpoint.
//!
//! Each payload becomes exactly one `repository_dispatch` call:
//!
//! ```text
//! POST {api_url}/repos/{owner}/{repo}/dispatches
//! {"event_type": "error-detected", "client_payload": {...}}
//! ```
//!
//! There is no retry here. A failed call is reported back to the pipeline,
//! which decides what the invoker is told.

use crate::config::DispatchConfig;
use crate::error::DispatchFailure;
use crate::http::get_client;
use crate::payload::ErrorDispatchPayload;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

const ACCEPT_VALUE: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const USER_AGENT_VALUE: &str = concat!("error-dispatch/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Failure(DispatchFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub payload: ErrorDispatchPayload,
    pub outcome: DispatchOutcome,
}

impl DispatchResult {
    pub fn success(payload: ErrorDispatchPayload) -> Self {
        Self {
            payload,
            outcome: DispatchOutcome::Success,
        }
    }

    pub fn failure(payload: ErrorDispatchPayload, failure: DispatchFailure) -> Self {
        Self {
            payload,
            outcome: DispatchOutcome::Failure(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == DispatchOutcome::Success
    }

    pub fn failure_reason(&self) -> Option<&DispatchFailure> {
        match &self.outcome {
            DispatchOutcome::Success => None,
            DispatchOutcome::Failure(failure) => Some(failure),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Sends one payload. Called exactly once per payload per invocation.
    async fn dispatch(&self, payload: ErrorDispatchPayload) -> DispatchResult;
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    event_type: &'a str,
    client_payload: &'a ErrorDispatchPayload,
}

/// Triggers a repository workflow through the `repository_dispatch` API.
#[derive(Clone)]
pub struct RepositoryDispatcher {
    client: reqwest::Client,
    url: String,
    event_type: String,
    timeout: Duration,
    token: String,
}

impl RepositoryDispatcher {
    #[must_use]
    pub fn new(config: &DispatchConfig) -> Self {
        RepositoryDispatcher {
            client: get_client(config.https_proxy.as_deref(), config.dispatch_timeout),
            url: config.dispatch_url(),
            event_type: config.event_type.clone(),
            timeout: config.dispatch_timeout,
            token: config.token.clone(),
        }
    }

    async fn send(&self, payload: &ErrorDispatchPayload) -> Result<(), DispatchFailure> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .header(ACCEPT, ACCEPT_VALUE)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .json(&DispatchRequest {
                event_type: &self.event_type,
                client_payload: payload,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchFailure::Timeout
                } else {
                    DispatchFailure::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DispatchFailure::Unauthorized(status))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(DispatchFailure::RateLimited),
            _ => Err(DispatchFailure::Status(
                status,
                response.text().await.unwrap_or_default(),
            )),
        }
    }
}

#[async_trait]
impl Dispatcher for RepositoryDispatcher {
    async fn dispatch(&self, payload: ErrorDispatchPayload) -> DispatchResult {
        info!(
            "DISPATCH | Triggering workflow for {} at {} from {}/{}",
            payload.error_kind, payload.timestamp, payload.source_id, payload.stream_id
        );
        let time = Instant::now();
        let sent = tokio::time::timeout(self.timeout, self.send(&payload)).await;
        let elapsed = time.elapsed();

        match sent {
            Ok(Ok(())) => {
                info!(
                    "DISPATCH | Workflow triggered in {} ms for {} at {}",
                    elapsed.as_millis(),
                    payload.error_kind,
                    payload.timestamp
                );
                DispatchResult::success(payload)
            }
            Ok(Err(failure)) => {
                error!(
                    "DISPATCH | Failed to trigger workflow for {} at {} from {}/{}: {failure}",
                    payload.error_kind, payload.timestamp, payload.source_id, payload.stream_id
                );
                DispatchResult::failure(payload, failure)
            }
            Err(_) => {
                error!(
                    "DISPATCH | Timed out after {} ms triggering workflow for {} at {} from {}/{}",
                    elapsed.as_millis(),
                    payload.error_kind,
                    payload.timestamp,
                    payload.source_id,
                    payload.stream_id
                );
                debug!("DISPATCH | Timeout is {} ms", self.timeout.as_millis());
                DispatchResult::failure(payload, DispatchFailure::Timeout)
            }
        }
    }
}
