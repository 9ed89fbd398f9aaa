// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One invocation of the dispatch pipeline.
//!
//! ```text
//!   Idle ─> Decoding ─> Parsing ─> Filtering ─> Dispatching ─> Done
//!              │                                                ^
//!              └──────────────── decode failure ────────────────┘ (Fatal)
//! ```
//!
//! Parsing and filtering only shrink the working set. Dispatch calls run
//! concurrently up to the configured limit and are all joined before the
//! invocation outcome is decided. Once the invocation deadline is within the
//! configured margin no new call is started and the remaining payloads are
//! reported as not attempted. Calls still in flight at that point are
//! abandoned and reported as timed out, so the margin stays free for
//! reporting the outcome.

use crate::config::DispatchConfig;
use crate::decoder::{decode, CompressedBatch, SubscriptionEvent};
use crate::dispatcher::{DispatchResult, Dispatcher, RepositoryDispatcher};
use crate::error::{DispatchFailure, PipelineError};
use crate::filter::select_eligible;
use crate::parser::{parse, ParsedEvent};
use crate::payload::ErrorDispatchPayload;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Every dispatch succeeded, or there was nothing to dispatch.
    Success,
    /// Some dispatches succeeded and others failed or were not attempted.
    Partial,
    /// Nothing was dispatched successfully although there were payloads.
    Failed,
    /// The batch could not be decoded.
    Fatal,
}

impl Completion {
    fn from_results(results: &[DispatchResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        if succeeded == results.len() {
            Completion::Success
        } else if succeeded > 0 {
            Completion::Partial
        } else {
            Completion::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Decoding,
    Parsing,
    Filtering,
    Dispatching,
    Done(Completion),
}

struct StateTracker {
    state: PipelineState,
}

impl StateTracker {
    fn new() -> Self {
        Self {
            state: PipelineState::Idle,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug!("PIPELINE | {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Summary of one invocation that got past decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    pub source_id: String,
    pub stream_id: String,
    pub records: usize,
    pub parsed: usize,
    pub eligible: usize,
    /// Eligible events dropped because no payload could be built for them.
    pub payload_failures: usize,
    /// One entry per built payload, in batch order.
    pub results: Vec<DispatchResult>,
    pub completion: Completion,
}

impl InvocationReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter_map(DispatchResult::failure_reason)
            .filter(|f| **f != DispatchFailure::NotAttempted)
            .count()
    }

    pub fn not_attempted(&self) -> usize {
        self.results
            .iter()
            .filter_map(DispatchResult::failure_reason)
            .filter(|f| **f == DispatchFailure::NotAttempted)
            .count()
    }

    /// Converts the report into the signal returned to the invoker.
    ///
    /// Any failed or skipped dispatch fails the invocation so the batch can be
    /// redelivered, even when other dispatches of the batch went through.
    pub fn into_result(self) -> Result<InvocationReport, PipelineError> {
        let Some(first) = self.results.iter().find_map(DispatchResult::failure_reason) else {
            return Ok(self);
        };
        Err(PipelineError::Dispatch {
            failed: self.failed(),
            not_attempted: self.not_attempted(),
            first: first.clone(),
        })
    }
}

pub struct Pipeline {
    dispatcher: Arc<dyn Dispatcher>,
    max_concurrency: usize,
    deadline_margin: Duration,
    max_decompressed_bytes: usize,
}

impl Pipeline {
    pub fn new(config: &DispatchConfig, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Pipeline {
            dispatcher,
            max_concurrency: config.max_concurrency.max(1),
            deadline_margin: config.deadline_margin,
            max_decompressed_bytes: config.max_decompressed_bytes,
        }
    }

    /// Pipeline dispatching through the repository dispatch API.
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config, Arc::new(RepositoryDispatcher::new(config)))
    }

    /// Runs one delivery and returns the invoker signal.
    pub async fn handle(
        &self,
        event: &SubscriptionEvent,
        deadline: Option<Instant>,
    ) -> Result<InvocationReport, PipelineError> {
        self.run(&event.aws_logs, deadline).await?.into_result()
    }

    /// Runs one batch through every stage.
    ///
    /// Only a decode failure is returned as an error; dispatch failures are
    /// part of the report.
    pub async fn run(
        &self,
        batch: &CompressedBatch,
        deadline: Option<Instant>,
    ) -> Result<InvocationReport, PipelineError> {
        let mut tracker = StateTracker::new();

        tracker.enter(PipelineState::Decoding);
        let log_batch = match decode(batch, self.max_decompressed_bytes) {
            Ok(log_batch) => log_batch,
            Err(e) => {
                error!("PIPELINE | Failed to decode batch: {e}");
                tracker.enter(PipelineState::Done(Completion::Fatal));
                return Err(e.into());
            }
        };
        if log_batch.is_control_message() {
            info!("PIPELINE | Received subscription control message");
        }

        tracker.enter(PipelineState::Parsing);
        let parsed: Vec<Option<ParsedEvent>> = log_batch.records.iter().map(parse).collect();
        let parsed_count = parsed.iter().flatten().count();

        tracker.enter(PipelineState::Filtering);
        let eligible = select_eligible(parsed);
        if eligible.is_empty() {
            info!("PIPELINE | No error records found, skipping dispatch");
        }

        let payloads: Vec<ErrorDispatchPayload> = eligible
            .iter()
            .filter_map(|event| match ErrorDispatchPayload::build(event, &log_batch) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(
                        "PAYLOAD | Skipping error event from {}/{}: {e}",
                        log_batch.source_id, log_batch.stream_id
                    );
                    None
                }
            })
            .collect();

        tracker.enter(PipelineState::Dispatching);
        let results = self.dispatch_all(payloads, deadline).await;
        let completion = Completion::from_results(&results);
        tracker.enter(PipelineState::Done(completion));

        let report = InvocationReport {
            source_id: log_batch.source_id,
            stream_id: log_batch.stream_id,
            records: log_batch.records.len(),
            parsed: parsed_count,
            eligible: eligible.len(),
            payload_failures: eligible.len() - results.len(),
            results,
            completion,
        };
        info!(
            "PIPELINE | Completed {:?}: {} dispatched, {} failed, {} not attempted",
            report.completion,
            report.succeeded(),
            report.failed(),
            report.not_attempted()
        );
        Ok(report)
    }

    async fn acquire(
        &self,
        semaphore: &Arc<Semaphore>,
        cutoff: Option<Instant>,
    ) -> Option<OwnedSemaphorePermit> {
        let Some(cutoff) = cutoff else {
            return Arc::clone(semaphore).acquire_owned().await.ok();
        };
        let permit = tokio::time::timeout_at(cutoff, Arc::clone(semaphore).acquire_owned())
            .await
            .ok()?
            .ok()?;
        // A permit freed by a call abandoned at the cutoff must not start another one.
        (Instant::now() < cutoff).then_some(permit)
    }

    async fn dispatch_all(
        &self,
        payloads: Vec<ErrorDispatchPayload>,
        deadline: Option<Instant>,
    ) -> Vec<DispatchResult> {
        // Kept to report payloads whose task never returned.
        let copies = payloads.clone();
        let mut results: Vec<Option<DispatchResult>> = vec![None; payloads.len()];
        let cutoff = deadline.map(|deadline| {
            deadline
                .checked_sub(self.deadline_margin)
                .unwrap_or_else(Instant::now)
        });
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        let mut pending = payloads.into_iter().enumerate();
        while let Some((index, payload)) = pending.next() {
            let Some(permit) = self.acquire(&semaphore, cutoff).await else {
                warn!(
                    "PIPELINE | Invocation deadline is near, not attempting {} remaining dispatch(es)",
                    copies.len() - index
                );
                results[index] = Some(DispatchResult::failure(
                    payload,
                    DispatchFailure::NotAttempted,
                ));
                for (index, payload) in pending.by_ref() {
                    results[index] = Some(DispatchResult::failure(
                        payload,
                        DispatchFailure::NotAttempted,
                    ));
                }
                break;
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            tasks.spawn(async move {
                let _permit = permit;
                let result = match cutoff {
                    Some(cutoff) => dispatch_before(dispatcher.as_ref(), payload, cutoff).await,
                    None => dispatcher.dispatch(payload).await,
                };
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("PIPELINE | Dispatch task failed: {e}"),
            }
        }

        results
            .into_iter()
            .zip(copies)
            .map(|(result, payload)| {
                result.unwrap_or_else(|| {
                    DispatchResult::failure(
                        payload,
                        DispatchFailure::Transport("dispatch task did not complete".to_string()),
                    )
                })
            })
            .collect()
    }
}

/// Runs one dispatch, giving up on it once `cutoff` is reached.
async fn dispatch_before(
    dispatcher: &dyn Dispatcher,
    payload: ErrorDispatchPayload,
    cutoff: Instant,
) -> DispatchResult {
    let copy = payload.clone();
    match tokio::time::timeout_at(cutoff, dispatcher.dispatch(payload)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "PIPELINE | Abandoned dispatch for {} at {} from {}/{} at the invocation deadline",
                copy.error_kind, copy.timestamp, copy.source_id, copy.stream_id
            );
            DispatchResult::failure(copy, DispatchFailure::Timeout)
        }
    }
}
