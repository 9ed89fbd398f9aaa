// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parsing of raw log records into structured events.
//!
//! Records are untyped text. Application errors are written as a JSON object
//! such as:
//!
//! ```text
//! {"timestamp":"2025-01-01T00:00:00Z","context":"GET /users","severity":"ERROR",
//!  "error":{"name":"TypeError","message":"x is not a function","stack":"..."}}
//! ```
//!
//! The object may also sit behind the function runtime's text prefix
//! (`<timestamp>\t<request id>\t<LEVEL>\t<json>`). Parsing never fails the
//! batch: a record that does not yield an event is reported through
//! [`ParseFailure`] and dropped by the caller.
//!
//! Only `severity` decides whether a record is usable. Informational fields
//! with an unexpected type are treated as absent rather than rejecting the
//! record, and an object-valued context is kept as its JSON text.

use crate::decoder::RawRecord;
use crate::error::ParseFailure;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Other(String),
}

impl Severity {
    /// Level names are matched exactly as written by the logger.
    pub fn from_label(label: &str) -> Self {
        match label {
            "TRACE" => Self::Trace,
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            "FATAL" | "CRITICAL" => Self::Fatal,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "TRACE"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Fatal => write!(f, "FATAL"),
            Self::Other(label) => write!(f, "{label}"),
        }
    }
}

/// Error detail embedded in a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorDetail {
    pub kind: Option<String>,
    pub message: Option<String>,
    pub trace: Option<String>,
}

impl ErrorDetail {
    /// Reads the detail object, accepting `name` for the kind and `stack` for
    /// the trace. Anything other than an object carries no detail.
    fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let mut first_text = |keys: &[&str]| keys.iter().find_map(|key| text(fields.remove(*key)));
        Some(ErrorDetail {
            kind: first_text(&["kind", "name"]),
            message: first_text(&["message"]),
            trace: first_text(&["trace", "stack"]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    /// ISO-8601 timestamp written by the application, when present.
    pub timestamp: Option<String>,
    pub severity: Severity,
    pub context_label: Option<String>,
    /// Free-form top-level message, when present.
    pub message: Option<String>,
    pub error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct RecordShape {
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    severity: Option<Value>,
    #[serde(default, rename = "contextLabel")]
    context_label: Option<Value>,
    #[serde(default)]
    context: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

fn text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        _ => None,
    }
}

/// Strings as they are, other non-null values as their JSON text.
fn label(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Returns the JSON object held by a record, stripping the runtime text prefix
/// if the line does not start with one.
fn json_body(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    let tail = trimmed.splitn(4, '\t').nth(3)?.trim_start();
    tail.starts_with('{').then_some(tail)
}

/// Parses one record's text into an event.
pub fn parse_record(raw: &str) -> Result<ParsedEvent, ParseFailure> {
    if raw.trim().is_empty() {
        return Err(ParseFailure::Empty);
    }
    let body = json_body(raw)
        .ok_or_else(|| ParseFailure::NotJson("record does not hold a JSON object".to_string()))?;

    let shape: RecordShape = serde_json::from_str(body).map_err(|e| {
        if e.is_data() {
            ParseFailure::Malformed(e.to_string())
        } else {
            ParseFailure::NotJson(e.to_string())
        }
    })?;

    let severity = match shape.severity {
        None | Some(Value::Null) => return Err(ParseFailure::MissingSeverity),
        Some(Value::String(label)) => Severity::from_label(&label),
        Some(other) => {
            return Err(ParseFailure::Malformed(format!(
                "severity is not a string: {other}"
            )))
        }
    };

    Ok(ParsedEvent {
        timestamp: text(shape.timestamp),
        severity,
        context_label: label(shape.context_label).or_else(|| label(shape.context)),
        message: text(shape.message),
        error: shape.error.and_then(ErrorDetail::from_value),
    })
}

/// Parses a delivered record, logging and discarding it when it is unusable.
pub fn parse(record: &RawRecord) -> Option<ParsedEvent> {
    match parse_record(&record.message) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(
                "PARSER | Skipping record {}: {e}",
                record.id.as_deref().unwrap_or("<no id>")
            );
            None
        }
    }
}
