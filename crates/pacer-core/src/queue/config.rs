//! Queue configuration, fixed at construction.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RetryPolicy;
use crate::error::ConfigError;

/// Configuration for a [`ThrottleQueue`](super::ThrottleQueue).
///
/// Deserializes from TOML with every field optional:
///
/// ```toml
/// max_concurrent = 3
/// min_delay_ms = 200
/// max_retries = 3
///
/// [retry]
/// base_delay_ms = 2000
/// multiplier = 2.0
/// retryable_statuses = [508]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of operations holding a slot at once.
    pub max_concurrent: usize,

    /// Pacing delay applied before every invocation.
    #[serde(rename = "min_delay_ms", with = "millis")]
    pub min_delay: Duration,

    /// Retries allowed per item before a transient failure becomes terminal.
    pub max_retries: u32,

    /// Backoff schedule and retryable status allow-list.
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            min_delay: Duration::from_millis(200),
            max_retries: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n;
        self
    }

    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        let multiplier = self.retry.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier));
        }
        if let Some(&code) = self
            .retry
            .retryable_statuses
            .iter()
            .find(|code| !(100..=599).contains(*code))
        {
            return Err(ConfigError::InvalidStatus(code));
        }
        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
