//! Retry policy: classifies failures and decides backoff delays.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{Decision, FailReason};

/// HTTP 508 Loop Detected, the overload signature of the upstream content API.
pub const LOOP_DETECTED: u16 = 508;

/// Retry policy for failed operations.
///
/// Only failures whose upstream status is in `retryable_statuses` are retried.
/// The allow-list defaults to `{508}` and is never widened implicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    #[serde(rename = "base_delay_ms", with = "crate::queue::config::millis")]
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upstream status codes treated as transient overload.
    pub retryable_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            retryable_statuses: BTreeSet::from([LOOP_DETECTED]),
        }
    }
}

impl RetryPolicy {
    /// Sets the delay before the first retry.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Replaces the retryable status allow-list.
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Whether a failure carrying `status` is a transient overload.
    ///
    /// Failures without a status are never retried.
    pub fn is_retryable(&self, status: Option<u16>) -> bool {
        status.is_some_and(|code| self.retryable_statuses.contains(&code))
    }

    /// Calculate the delay before a retry.
    ///
    /// # Arguments
    /// * `retry_count` - Retry number being scheduled (1-indexed, already incremented).
    ///
    /// delay = base_delay * multiplier^(retry_count - 1)
    ///
    /// With base_delay=2s, multiplier=2.0 this is `2^retry_count` seconds:
    /// - retry 1: 2s
    /// - retry 2: 4s
    /// - retry 3: 8s
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }

    /// Decide what happens to an operation that just failed.
    ///
    /// `retry_count` is the number of retries already spent on the item.
    pub fn decide(&self, retry_count: u32, max_retries: u32, status: Option<u16>) -> Decision {
        if !self.is_retryable(status) {
            return Decision::Fail {
                reason: FailReason::NotRetryable,
            };
        }
        if retry_count >= max_retries {
            return Decision::Fail {
                reason: FailReason::RetriesExhausted,
            };
        }
        let retry_count = retry_count + 1;
        Decision::Retry {
            retry_count,
            delay: self.next_delay(retry_count),
        }
    }
}
