// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::decoder::LogBatch;
use crate::error::PayloadBuildError;
use crate::parser::ParsedEvent;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
pub const NO_STACK_TRACE: &str = "No stack trace available";
pub const UNKNOWN_CONTEXT: &str = "Unknown context";
pub const DEFAULT_ERROR_KIND: &str = "Error";

/// Trigger payload understood by the downstream workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDispatchPayload {
    pub error_message: String,
    pub error_stack: String,
    #[serde(rename = "error_type")]
    pub error_kind: String,
    pub timestamp: String,
    #[serde(rename = "log_group")]
    pub source_id: String,
    #[serde(rename = "log_stream")]
    pub stream_id: String,
    #[serde(rename = "context")]
    pub context_label: String,
}

fn present(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

impl ErrorDispatchPayload {
    /// Builds the payload for one eligible event.
    ///
    /// Message, stack and context fall back to placeholders. The timestamp has
    /// no fallback since the workflow correlates on it.
    pub fn build(event: &ParsedEvent, batch: &LogBatch) -> Result<Self, PayloadBuildError> {
        let timestamp =
            present(event.timestamp.as_ref()).ok_or(PayloadBuildError::MissingTimestamp)?;
        let error = event.error.as_ref();

        Ok(Self {
            error_message: present(error.and_then(|e| e.message.as_ref()))
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
            error_stack: present(error.and_then(|e| e.trace.as_ref()))
                .unwrap_or_else(|| NO_STACK_TRACE.to_string()),
            error_kind: present(error.and_then(|e| e.kind.as_ref()))
                .unwrap_or_else(|| DEFAULT_ERROR_KIND.to_string()),
            timestamp,
            source_id: batch.source_id.clone(),
            stream_id: batch.stream_id.clone(),
            context_label: present(event.context_label.as_ref())
                .unwrap_or_else(|| UNKNOWN_CONTEXT.to_string()),
        })
    }
}
