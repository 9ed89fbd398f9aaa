// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Error Dispatch
//!
//! Receives compressed log subscription batches, keeps the records that
//! describe an application error, and triggers one automation workflow per
//! error.
//!
//! ## Architecture
//!
//! - [`decoder`]: base64 and gzip decoding of a delivery into a [`decoder::LogBatch`]
//! - [`parser`]: per-record parsing into [`parser::ParsedEvent`], never fatal
//! - [`filter`]: selection of ERROR events carrying error detail
//! - [`payload`]: mapping of an event to the workflow trigger payload
//! - [`dispatcher`]: one outbound call per payload
//! - [`pipeline`]: wiring of the stages for one invocation

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod decoder;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod http;
pub mod logger;
pub mod parser;
pub mod payload;
pub mod pipeline;

pub use config::DispatchConfig;
pub use error::{ConfigError, DecodeError, DispatchFailure, PipelineError};
pub use pipeline::{Completion, InvocationReport, Pipeline};
