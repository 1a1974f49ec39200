//! Item state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued item.
///
/// State transitions:
/// - Queued -> Admitted -> Succeeded
/// - Queued -> Admitted -> RetryScheduled -> Queued (head of the buffer)
/// - Queued -> Admitted -> Failed (terminal error or retries exhausted)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting in the buffer.
    Queued,

    /// Holding a concurrency slot (pacing, running, or backing off).
    Admitted,

    /// Waiting out a backoff before going back to the head of the buffer.
    RetryScheduled,

    /// Ticket settled with the operation's value.
    Succeeded,

    /// Ticket settled with the operation's error.
    Failed,
}

impl ItemState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Queued, Admitted)
                | (Admitted, Succeeded)
                | (Admitted, Failed)
                | (Admitted, RetryScheduled)
                | (RetryScheduled, Queued)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_states_have_no_way_out() {
        for next in [ItemState::Queued, ItemState::Admitted, ItemState::RetryScheduled] {
            assert!(!ItemState::Succeeded.can_transition_to(next));
            assert!(!ItemState::Failed.can_transition_to(next));
        }
    }

    #[test]
    fn retry_loops_back_through_queued() {
        assert!(ItemState::Admitted.can_transition_to(ItemState::RetryScheduled));
        assert!(ItemState::RetryScheduled.can_transition_to(ItemState::Queued));
        assert!(!ItemState::RetryScheduled.can_transition_to(ItemState::Admitted));
        assert!(!ItemState::Succeeded.can_transition_to(ItemState::Queued));
    }

    #[test]
    fn serializes_as_snake_case() {
        let s = serde_json::to_string(&ItemState::RetryScheduled).unwrap();
        assert_eq!(s, "\"retry_scheduled\"");
    }
}
