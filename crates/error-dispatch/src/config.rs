// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use std::env;
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_EVENT_TYPE: &str = "error-detected";
const DEFAULT_DISPATCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_CONCURRENCY: usize = 8;
const DEFAULT_DEADLINE_MARGIN_MS: u64 = 2_000;
const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 10 * 1024 * 1024; // 10MB in Bytes

/// Configuration for one deployment of the dispatch pipeline
#[derive(Clone)]
pub struct DispatchConfig {
    /// Bearer token for the automation endpoint
    pub token: String,
    /// Owner of the repository whose workflow is triggered
    pub owner: String,
    /// Repository whose workflow is triggered
    pub repo: String,
    /// Base URL of the automation API, without trailing slash
    pub api_url: String,
    /// `event_type` discriminator sent with every dispatch
    pub event_type: String,
    /// Bound on a single dispatch call, including reading the response
    pub dispatch_timeout: Duration,
    /// Maximum number of dispatch calls in flight at once
    pub max_concurrency: usize,
    /// No new dispatch is started once the invocation deadline is this close
    pub deadline_margin: Duration,
    /// Upper bound on the size of a decompressed batch
    pub max_decompressed_bytes: usize,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl DispatchConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(token: &str, owner: &str, repo: &str) -> Self {
        Self {
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            event_type: DEFAULT_EVENT_TYPE.to_string(),
            dispatch_timeout: Duration::from_millis(DEFAULT_DISPATCH_TIMEOUT_MS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadline_margin: Duration::from_millis(DEFAULT_DEADLINE_MARGIN_MS),
            max_decompressed_bytes: DEFAULT_MAX_DECOMPRESSED_BYTES,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = env::var("GITHUB_TOKEN").map_err(|_| ConfigError::Missing("GITHUB_TOKEN"))?;
        let owner = env::var("GITHUB_OWNER").map_err(|_| ConfigError::Missing("GITHUB_OWNER"))?;
        let repo = env::var("GITHUB_REPO").map_err(|_| ConfigError::Missing("GITHUB_REPO"))?;

        // GITHUB_API_URL will primarily be used for integration tests and enterprise hosts
        let api_url = env::var("GITHUB_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let event_type =
            env::var("DISPATCH_EVENT_TYPE").unwrap_or_else(|_| DEFAULT_EVENT_TYPE.to_string());
        let dispatch_timeout = Duration::from_millis(
            env::var("DISPATCH_TIMEOUT_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(DEFAULT_DISPATCH_TIMEOUT_MS),
        );
        let max_concurrency = env::var("DISPATCH_MAX_CONCURRENCY")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let deadline_margin = Duration::from_millis(
            env::var("DISPATCH_DEADLINE_MARGIN_MS")
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(DEFAULT_DEADLINE_MARGIN_MS),
        );
        let max_decompressed_bytes = env::var("MAX_DECOMPRESSED_BYTES")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_DECOMPRESSED_BYTES);
        let https_proxy = env::var("HTTPS_PROXY").ok();
        let log_level = env::var("LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            token,
            owner,
            repo,
            api_url,
            event_type,
            dispatch_timeout,
            max_concurrency,
            deadline_margin,
            max_decompressed_bytes,
            https_proxy,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "GITHUB_TOKEN cannot be empty".to_string(),
            ));
        }

        if self.owner.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "GITHUB_OWNER cannot be empty".to_string(),
            ));
        }

        if self.repo.trim().is_empty() {
            return Err(ConfigError::Invalid("GITHUB_REPO cannot be empty".to_string()));
        }

        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "GITHUB_API_URL cannot be empty".to_string(),
            ));
        }

        if self.event_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "DISPATCH_EVENT_TYPE cannot be empty".to_string(),
            ));
        }

        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "dispatch timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "dispatch concurrency must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Endpoint receiving repository dispatch events.
    pub fn dispatch_url(&self) -> String {
        format!("{}/repos/{}/{}/dispatches", self.api_url, self.owner, self.repo)
    }
}

impl fmt::Debug for DispatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchConfig")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("api_url", &self.api_url)
            .field("event_type", &self.event_type)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .field("deadline_margin", &self.deadline_margin)
            .field("max_decompressed_bytes", &self.max_decompressed_bytes)
            .field("https_proxy", &self.https_proxy)
            .field("log_level", &self.log_level)
            .finish()
    }
}
