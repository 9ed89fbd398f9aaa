// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy of the dispatch pipeline.
//!
//! Only [`DecodeError`] is fatal to an invocation. Parse, payload and dispatch
//! errors are isolated to a single record, event or call and are aggregated by
//! the pipeline into a [`PipelineError::Dispatch`] when the invoker has to be
//! told about them.

use reqwest::StatusCode;

/// Malformed subscription batch. Aborts the whole invocation.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("batch is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("failed to decompress batch: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("decompressed batch exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("malformed batch envelope: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// Reason a single raw record did not yield a parsed event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("record is empty")]
    Empty,

    #[error("record is not JSON: {0}")]
    NotJson(String),

    #[error("record has an unexpected shape: {0}")]
    Malformed(String),

    #[error("record has no severity")]
    MissingSeverity,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadBuildError {
    #[error("event has no timestamp")]
    MissingTimestamp,
}

/// Failure of one dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchFailure {
    #[error("dispatch timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("credential rejected with status {0}")]
    Unauthorized(StatusCode),

    #[error("rate limited by the automation endpoint")]
    RateLimited,

    #[error("unexpected status {0}: {1}")]
    Status(StatusCode, String),

    #[error("not attempted before the invocation deadline")]
    NotAttempted,
}

/// Outcome reported to the invoker of the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{failed} dispatch(es) failed and {not_attempted} were not attempted, first failure: {first}")]
    Dispatch {
        failed: usize,
        not_attempted: usize,
        first: DispatchFailure,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
