//! pacer-core
//!
//! An in-process throttle for calls to a fragile upstream API.
//!
//! - **queue**: `ThrottleQueue` (bounded concurrency, paced admission, retry
//!   with exponential backoff on transient overload), `QueueConfig`,
//!   `RetryPolicy`, `Ticket`
//! - **domain**: item ids, item states, retry decisions
//! - **error**: `UpstreamStatus` classification seam, `FetchError`, config and build errors
//! - **observability**: `QueueCounts` snapshots

pub mod domain;
pub mod error;
pub mod observability;
pub mod queue;

pub use error::{BuildError, ConfigError, FetchError, UpstreamStatus};
pub use observability::QueueCounts;
pub use queue::{QueueConfig, RetryPolicy, ThrottleQueue, Ticket};
