use serde::{Deserialize, Serialize};

/// Snapshot of a queue's counters.
///
/// `pending` and `in_flight` are gauges; the rest only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub submitted: u64,
    pub attempts: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub abandoned: u64,
}

impl QueueCounts {
    /// Items whose ticket has been settled.
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed
    }
}
