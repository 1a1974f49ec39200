//! Queue module: configuration, retry policy, pacing and the throttle queue.

pub(crate) mod config;
mod pacer;
mod record;
mod retry;
mod throttle;
mod ticket;

pub use config::QueueConfig;
pub use retry::{LOOP_DETECTED, RetryPolicy};
pub use throttle::ThrottleQueue;
pub use ticket::Ticket;
