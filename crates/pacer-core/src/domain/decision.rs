//! Decision model: what happens to an item after a failed attempt.

use std::fmt;
use std::time::Duration;

/// The next action to take for a failed item.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Put the item back at the head of the buffer after `delay`.
    Retry {
        /// Retry number, already incremented (1 for the first retry).
        retry_count: u32,
        delay: Duration,
    },

    /// Settle the caller's ticket with the error.
    Fail { reason: FailReason },
}

/// Why a failure is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    /// The error carries no retryable upstream status.
    NotRetryable,

    /// The error was retryable but `max_retries` is spent.
    RetriesExhausted,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::NotRetryable => write!(f, "not_retryable"),
            FailReason::RetriesExhausted => write!(f, "retries_exhausted"),
        }
    }
}
