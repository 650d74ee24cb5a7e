//! Configuration loading and validation.
//!
//! Everything reads through a lookup function so tests can supply variables
//! without touching the process environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::PipelineConfig;

/// Slowest accepted refill rate: one token every ~17 minutes.
const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key}: cannot parse {value:?}: {reason}")]
    Malformed {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{key}: {reason}")]
    OutOfRange { key: &'static str, reason: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| ConfigError::Malformed {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<Duration>, ConfigError> {
    Ok(parse::<u64>(lookup, key)?.map(Duration::from_millis))
}

fn out_of_range(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::OutOfRange {
        key,
        reason: reason.into(),
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `KINSHIP_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = parse::<u32>(&lookup, "KINSHIP_RETRY_MAX_RETRIES")? {
            config.retry.max_attempts = v;
        }
        if let Some(v) = millis(&lookup, "KINSHIP_RETRY_INITIAL_BACKOFF_MS")? {
            config.retry.initial_backoff = v;
        }
        if let Some(v) = millis(&lookup, "KINSHIP_RETRY_MAX_BACKOFF_MS")? {
            config.retry.max_backoff = v;
        }

        if let Some(v) = millis(&lookup, "KINSHIP_CIRCUIT_TIMEOUT_MS")? {
            config.circuit.timeout = v;
        }
        if let Some(v) = parse::<usize>(&lookup, "KINSHIP_CIRCUIT_MAX_CONCURRENT")? {
            config.circuit.max_concurrent = v;
        }
        if let Some(v) = parse::<f64>(&lookup, "KINSHIP_CIRCUIT_ERROR_THRESHOLD")? {
            config.circuit.error_threshold = v;
        }
        if let Some(v) = parse::<u32>(&lookup, "KINSHIP_CIRCUIT_VOLUME_THRESHOLD")? {
            config.circuit.volume_threshold = v;
        }
        if let Some(v) = millis(&lookup, "KINSHIP_CIRCUIT_SLEEP_WINDOW_MS")? {
            config.circuit.sleep_window = v;
        }

        if let Some(v) = parse::<f64>(&lookup, "KINSHIP_RATE_RPS")? {
            config.rate.requests_per_second = v;
        }
        if let Some(v) = parse::<u32>(&lookup, "KINSHIP_RATE_BURST")? {
            config.rate.burst_size = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(out_of_range("KINSHIP_RETRY_MAX_RETRIES", "at least one attempt is required"));
        }
        if retry.initial_backoff > retry.max_backoff {
            return Err(out_of_range(
                "KINSHIP_RETRY_INITIAL_BACKOFF_MS",
                "initial backoff exceeds max backoff",
            ));
        }
        if !(retry.multiplier.is_finite() && retry.multiplier >= 1.0) {
            return Err(out_of_range("retry.multiplier", "must be a finite number >= 1"));
        }
        if !(0.0..=1.0).contains(&retry.jitter) {
            return Err(out_of_range("retry.jitter", "must be within 0.0..=1.0"));
        }

        let circuit = &self.circuit;
        if circuit.timeout.is_zero() {
            return Err(out_of_range("KINSHIP_CIRCUIT_TIMEOUT_MS", "must be positive"));
        }
        if circuit.max_concurrent == 0 {
            return Err(out_of_range("KINSHIP_CIRCUIT_MAX_CONCURRENT", "must be positive"));
        }
        if !(circuit.error_threshold > 0.0 && circuit.error_threshold <= 100.0) {
            return Err(out_of_range(
                "KINSHIP_CIRCUIT_ERROR_THRESHOLD",
                "must be a percentage in (0, 100]",
            ));
        }
        if circuit.volume_threshold == 0 {
            return Err(out_of_range("KINSHIP_CIRCUIT_VOLUME_THRESHOLD", "must be positive"));
        }
        if circuit.rolling_window.is_zero() {
            return Err(out_of_range("circuit.rolling_window", "must be positive"));
        }

        let rate = &self.rate;
        if !(rate.requests_per_second.is_finite()
            && rate.requests_per_second >= MIN_REQUESTS_PER_SECOND)
        {
            return Err(out_of_range(
                "KINSHIP_RATE_RPS",
                "must be a finite number of at least 0.001",
            ));
        }
        if rate.burst_size == 0 {
            return Err(out_of_range("KINSHIP_RATE_BURST", "must be positive"));
        }

        Ok(())
    }
}

/// Where families are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String },
}

impl StorageConfig {
    /// `USE_PERSISTENT_STORES=true` selects Postgres at `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let persistent = lookup("USE_PERSISTENT_STORES")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        if !persistent {
            return Ok(Self::InMemory);
        }

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self::Postgres { database_url })
    }
}
