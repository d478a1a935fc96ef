// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client configuration.
//!
//! A [`Config`] is built once, either programmatically or from `EDGE_LOG_*`
//! environment variables, and handed to [`crate::EdgeLog::start`]. The two
//! thresholds it carries are only initial values: they live on in
//! [`runtime::RuntimeSettings`] where the application and the collector can
//! change them.

pub mod log_level;
pub mod runtime;

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::logs::constants::{
    DEFAULT_EDGE_ADDRESS, DEFAULT_FLUSH_INTERVAL, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_REQUEST_TIMEOUT, RETRY_LIMIT,
};
use log_level::Level;

/// Configuration of one [`crate::EdgeLog`] client.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the collector. Without one, every event goes to the local
    /// sink and no connection is ever attempted.
    pub api_key: Option<String>,
    /// Base URL of the collector (e.g. `https://edge.internal:8089`)
    pub edge_address: String,
    /// PEM encoded root certificate trusted for the collector connection
    pub edge_cert: Option<String>,
    /// Also render every event on the local sink when remote delivery is on
    pub log_local: bool,
    /// Render the local sink as JSON lines instead of text
    pub log_json: bool,
    /// Initial severity threshold
    pub log_level: Level,
    /// Initial verbosity threshold. Events with a larger verbosity are dropped.
    pub log_verbosity: i32,
    /// Period of the batch scheduler
    pub flush_interval: Duration,
    /// Per-request timeout of the collector transport
    pub request_timeout: Duration,
    pub edge_queue_capacity: usize,
    pub local_queue_capacity: usize,
    /// Consecutive failures of one session step before it is backtracked
    pub retry_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            edge_address: DEFAULT_EDGE_ADDRESS.to_string(),
            edge_cert: None,
            log_local: false,
            log_json: false,
            log_level: Level::default(),
            log_verbosity: 0,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            edge_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            local_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_limit: RETRY_LIMIT,
        }
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_millis(name: &str) -> Result<Option<Duration>, ConfigError> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| ConfigError::Invalid(format!("{name} must be a number of milliseconds: {e}"))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Create configuration from environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `EDGE_LOG_API_KEY` | `api_key` |
    /// | `EDGE_LOG_ADDRESS` | `edge_address` |
    /// | `EDGE_LOG_CERT` | `edge_cert` (path to a PEM file) |
    /// | `EDGE_LOG_LOCAL` | `log_local` |
    /// | `EDGE_LOG_JSON` | `log_json` |
    /// | `EDGE_LOG_LEVEL` | `log_level` |
    /// | `EDGE_LOG_VERBOSITY` | `log_verbosity` |
    /// | `EDGE_LOG_FLUSH_INTERVAL_MS` | `flush_interval` |
    /// | `EDGE_LOG_TIMEOUT_MS` | `request_timeout` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_key = env::var("EDGE_LOG_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());
        let edge_address = env::var("EDGE_LOG_ADDRESS").unwrap_or(defaults.edge_address);
        let edge_cert = match env::var("EDGE_LOG_CERT") {
            Ok(path) => Some(std::fs::read_to_string(&path).map_err(|e| {
                ConfigError::Invalid(format!("cannot read certificate {path}: {e}"))
            })?),
            Err(_) => None,
        };
        let log_level = match env::var("EDGE_LOG_LEVEL") {
            Ok(val) => val.parse::<Level>().map_err(ConfigError::Invalid)?,
            Err(_) => defaults.log_level,
        };
        let log_verbosity = match env::var("EDGE_LOG_VERBOSITY") {
            Ok(val) => val.trim().parse::<i32>().map_err(|e| {
                ConfigError::Invalid(format!("EDGE_LOG_VERBOSITY must be an integer: {e}"))
            })?,
            Err(_) => defaults.log_verbosity,
        };

        let config = Self {
            api_key,
            edge_address,
            edge_cert,
            log_local: env_flag("EDGE_LOG_LOCAL").unwrap_or(defaults.log_local),
            log_json: env_flag("EDGE_LOG_JSON").unwrap_or(defaults.log_json),
            log_level,
            log_verbosity,
            flush_interval: env_millis("EDGE_LOG_FLUSH_INTERVAL_MS")?
                .unwrap_or(defaults.flush_interval),
            request_timeout: env_millis("EDGE_LOG_TIMEOUT_MS")?
                .unwrap_or(defaults.request_timeout),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_some() && self.edge_address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "edge address cannot be empty when an API key is set".to_string(),
            ));
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "flush interval must be greater than 0".to_string(),
            ));
        }

        if self.edge_queue_capacity == 0 || self.local_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue capacities must be greater than 0".to_string(),
            ));
        }

        if self.retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "retry limit must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
