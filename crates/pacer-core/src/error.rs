use std::path::PathBuf;

use thiserror::Error;

/// Exposes the upstream status code carried by an operation's error.
///
/// The queue only retries errors whose status is on the retry allow-list.
/// Error types from fetch layers that know nothing about statuses can use the
/// default method and every failure is terminal.
pub trait UpstreamStatus {
    fn upstream_status(&self) -> Option<u16> {
        None
    }
}

impl<T: UpstreamStatus + ?Sized> UpstreamStatus for Box<T> {
    fn upstream_status(&self) -> Option<u16> {
        (**self).upstream_status()
    }
}

impl<T: UpstreamStatus + ?Sized> UpstreamStatus for std::sync::Arc<T> {
    fn upstream_status(&self) -> Option<u16> {
        (**self).upstream_status()
    }
}

impl UpstreamStatus for String {}
impl UpstreamStatus for &'static str {}
impl UpstreamStatus for std::io::Error {}

/// Failure of a call to the upstream content API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("upstream returned status {code}: {message}")]
    Status { code: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }
}

impl UpstreamStatus for FetchError {
    fn upstream_status(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            FetchError::Network(_) | FetchError::Timeout | FetchError::Decode(_) => None,
        }
    }
}

/// Rejected queue configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("retry multiplier must be a finite value >= 1.0, got {0}")]
    InvalidMultiplier(f64),

    #[error("retryable status {0} is not an HTTP status code")]
    InvalidStatus(u16),

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure to build a [`ThrottleQueue`](crate::queue::ThrottleQueue).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("throttle queue must be built inside a tokio runtime")]
    NoRuntime,
}
