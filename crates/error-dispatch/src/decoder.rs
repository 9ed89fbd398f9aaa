// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Decoding of log subscription deliveries.
//!
//! A delivery carries its records as base64 text wrapping a gzip stream, which
//! in turn holds a JSON envelope:
//!
//! ```text
//! {
//!   "messageType": "DATA_MESSAGE",
//!   "logGroup": "/aws/lambda/sample-app",
//!   "logStream": "2025/01/01/[$LATEST]abcdef",
//!   "logEvents": [{ "id": "1", "timestamp": 1735689600000, "message": "..." }]
//! }
//! ```
//!
//! Any stage failing makes the whole batch unusable, so every error here is
//! fatal to the invocation.

use crate::error::DecodeError;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::io::Read;
use tracing::{debug, info};

/// Delivery event as handed to the function by the log subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    #[serde(rename = "awslogs")]
    pub aws_logs: CompressedBatch,
}

/// Base64 encoded, gzip compressed batch envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedBatch {
    pub data: String,
}

impl CompressedBatch {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    #[serde(rename = "DATA_MESSAGE")]
    Data,
    /// Reachability check sent when the subscription is created.
    #[serde(rename = "CONTROL_MESSAGE")]
    Control,
    #[serde(other)]
    Unknown,
}

/// One log emission, as delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Ingestion time in milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub message: String,
}

/// Decoded batch. Records keep their delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogBatch {
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(rename = "logGroup")]
    pub source_id: String,
    #[serde(rename = "logStream")]
    pub stream_id: String,
    #[serde(rename = "logEvents")]
    pub records: Vec<RawRecord>,
}

impl LogBatch {
    pub fn is_control_message(&self) -> bool {
        self.message_type == MessageType::Control
    }
}

/// Decodes a delivery into a [`LogBatch`].
///
/// The decompressed envelope may not exceed `max_decompressed_bytes`.
pub fn decode(
    batch: &CompressedBatch,
    max_decompressed_bytes: usize,
) -> Result<LogBatch, DecodeError> {
    let compressed = STANDARD.decode(batch.data.as_bytes())?;
    debug!("DECODER | Decoded {} compressed bytes", compressed.len());

    // Read one byte past the limit so an oversized batch is detected without
    // inflating all of it.
    let mut decompressed = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .take(max_decompressed_bytes as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(DecodeError::Decompress)?;
    if decompressed.len() > max_decompressed_bytes {
        return Err(DecodeError::TooLarge {
            limit: max_decompressed_bytes,
        });
    }

    let log_batch: LogBatch =
        serde_json::from_slice(&decompressed).map_err(DecodeError::Envelope)?;

    info!(
        "DECODER | Received batch from {}/{} with {} records",
        log_batch.source_id,
        log_batch.stream_id,
        log_batch.records.len()
    );
    Ok(log_batch)
}
