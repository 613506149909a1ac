//! Monitor configuration.
//!
//! Defaults match the service's local development setup. Every field can be
//! overridden from `WORKFLOW_MONITOR_*` environment variables; the CLI loads a
//! `.env` file first.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::RetryPolicy;

pub const ENV_BASE_URL: &str = "WORKFLOW_MONITOR_BASE_URL";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "WORKFLOW_MONITOR_REQUEST_TIMEOUT_MS";
pub const ENV_MAX_STREAM_RETRIES: &str = "WORKFLOW_MONITOR_MAX_STREAM_RETRIES";
pub const ENV_BACKOFF_UNIT_MS: &str = "WORKFLOW_MONITOR_BACKOFF_UNIT_MS";
pub const ENV_RESULTS_DELAY_MS: &str = "WORKFLOW_MONITOR_RESULTS_DELAY_MS";
pub const ENV_PREFLIGHT: &str = "WORKFLOW_MONITOR_PREFLIGHT";
pub const ENV_STREAM_IDLE_TIMEOUT_MS: &str = "WORKFLOW_MONITOR_STREAM_IDLE_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_stream_retries")]
    pub max_stream_retries: u32,
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Pause between observing completion and requesting the results, so the
    /// server has persisted them.
    #[serde(default = "default_results_delay_ms")]
    pub results_delay_ms: u64,
    /// Probe the service health endpoint before each start request.
    #[serde(default)]
    pub preflight: bool,
    /// Longest silence tolerated on an open event stream. The server sends
    /// heartbeat comments every second or two, so a stall this long means
    /// the connection is dead and counts as a transport failure.
    #[serde(default = "default_stream_idle_timeout_ms")]
    pub stream_idle_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            max_stream_retries: default_max_stream_retries(),
            backoff_unit_ms: default_backoff_unit_ms(),
            results_delay_ms: default_results_delay_ms(),
            preflight: false,
            stream_idle_timeout_ms: default_stream_idle_timeout_ms(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overlaid with whatever `WORKFLOW_MONITOR_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`MonitorConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = non_empty(lookup(ENV_BASE_URL)) {
            config.base_url = value;
        }
        if let Some(value) = non_empty(lookup(ENV_REQUEST_TIMEOUT_MS)) {
            config.request_timeout_ms = parse_value(ENV_REQUEST_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_MAX_STREAM_RETRIES)) {
            config.max_stream_retries = parse_value(ENV_MAX_STREAM_RETRIES, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_BACKOFF_UNIT_MS)) {
            config.backoff_unit_ms = parse_value(ENV_BACKOFF_UNIT_MS, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_RESULTS_DELAY_MS)) {
            config.results_delay_ms = parse_value(ENV_RESULTS_DELAY_MS, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_PREFLIGHT)) {
            config.preflight = parse_flag(ENV_PREFLIGHT, &value)?;
        }
        if let Some(value) = non_empty(lookup(ENV_STREAM_IDLE_TIMEOUT_MS)) {
            config.stream_idle_timeout_ms = parse_value(ENV_STREAM_IDLE_TIMEOUT_MS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.base_url.trim();
        if base_url.is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL, got '{base_url}'"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stream_idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "stream_idle_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn results_delay(&self) -> Duration {
        Duration::from_millis(self.results_delay_ms)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_idle_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_stream_retries,
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_stream_retries() -> u32 {
    3
}

fn default_backoff_unit_ms() -> u64 {
    2_000
}

fn default_results_delay_ms() -> u64 {
    1_000
}

fn default_stream_idle_timeout_ms() -> u64 {
    30_000
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        message: format!("'{value}': {e}"),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            message: format!("'{value}' is not a boolean"),
        }),
    }
}
