// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Builders for subscription deliveries and pipeline configuration

use base64::{engine::general_purpose::STANDARD, Engine};
use error_dispatch::decoder::CompressedBatch;
use error_dispatch::DispatchConfig;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;

pub const DISPATCH_PATH: &str = "/repos/acme/service/dispatches";

/// Compresses and encodes an envelope the way the log subscription delivers it
pub fn deliver(envelope: &Value) -> CompressedBatch {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(envelope.to_string().as_bytes())
        .expect("failed to compress envelope");
    CompressedBatch::new(STANDARD.encode(encoder.finish().expect("failed to finish gzip stream")))
}

/// Data message for log group `g1` and stream `s1` holding the given records
pub fn data_message(records: &[&str]) -> CompressedBatch {
    let log_events: Vec<Value> = records
        .iter()
        .enumerate()
        .map(|(i, message)| {
            json!({
                "id": i.to_string(),
                "timestamp": 1_735_689_600_000_i64 + i as i64,
                "message": message,
            })
        })
        .collect();
    deliver(&json!({
        "messageType": "DATA_MESSAGE",
        "owner": "123456789012",
        "logGroup": "g1",
        "logStream": "s1",
        "subscriptionFilters": ["errors"],
        "logEvents": log_events,
    }))
}

/// Record as written by the sample application's error logger
pub fn application_error(name: &str, message: &str) -> String {
    json!({
        "timestamp": "2025-01-01T00:00:00.000Z",
        "context": "GET /error",
        "error": {"name": name, "message": message, "stack": format!("{name}: {message}\n    at handler")},
        "severity": "ERROR",
    })
    .to_string()
}

pub fn config(api_url: String) -> DispatchConfig {
    DispatchConfig {
        api_url,
        dispatch_timeout: Duration::from_secs(2),
        ..DispatchConfig::new("mock-token", "acme", "service")
    }
}
