//! Item record: bookkeeping + the type-erased operation.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::domain::{ItemId, ItemState};
use crate::error::UpstreamStatus;

/// Result of one invocation, with the typed value kept inside the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attempted {
    Succeeded,
    Failed { status: Option<u16> },
}

/// Object-safe view of a submitted operation.
///
/// The buffer holds operations of unrelated result types, so the typed
/// result stays inside the implementation until `settle` hands it to the
/// caller's ticket.
#[async_trait]
pub(crate) trait Operation: Send {
    /// Invoke the operation once and keep its outcome.
    async fn attempt(&mut self) -> Attempted;

    /// The error of the last attempt, if it failed.
    fn last_error(&self) -> Option<&dyn Display>;

    /// Deliver the last outcome to the ticket. Consumes the operation, so a
    /// ticket can only ever be settled once.
    fn settle(self: Box<Self>);
}

pub(crate) struct TypedOperation<F, T, E> {
    make: F,
    last: Option<Result<T, E>>,
    tx: oneshot::Sender<Result<T, E>>,
}

impl<F, T, E> TypedOperation<F, T, E> {
    pub(crate) fn new(make: F, tx: oneshot::Sender<Result<T, E>>) -> Self {
        Self {
            make,
            last: None,
            tx,
        }
    }
}

#[async_trait]
impl<F, Fut, T, E> Operation for TypedOperation<F, T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: UpstreamStatus + Display + Send + 'static,
{
    async fn attempt(&mut self) -> Attempted {
        let result = (self.make)().await;
        let attempted = match &result {
            Ok(_) => Attempted::Succeeded,
            Err(e) => Attempted::Failed {
                status: e.upstream_status(),
            },
        };
        self.last = Some(result);
        attempted
    }

    fn last_error(&self) -> Option<&dyn Display> {
        match &self.last {
            Some(Err(e)) => Some(e as &dyn Display),
            _ => None,
        }
    }

    fn settle(self: Box<Self>) {
        let this = *self;
        if let Some(result) = this.last {
            // The caller may have dropped its ticket; nothing to deliver then.
            let _ = this.tx.send(result);
        }
    }
}

/// Metadata + operation for an item in the queue.
pub(crate) struct ItemRecord {
    pub id: ItemId,
    pub state: ItemState,

    /// Retries spent so far. Only incremented when a retry is scheduled.
    pub retry_count: u32,

    /// Number of times the operation has been invoked.
    pub attempts: u32,

    pub submitted_at: Instant,
    operation: Box<dyn Operation>,
}

impl ItemRecord {
    pub fn new(id: ItemId, operation: Box<dyn Operation>) -> Self {
        Self {
            id,
            state: ItemState::Queued,
            retry_count: 0,
            attempts: 0,
            submitted_at: Instant::now(),
            operation,
        }
    }

    /// Queued -> Admitted.
    pub fn admit(&mut self) {
        self.transition(ItemState::Admitted);
    }

    pub async fn attempt(&mut self) -> Attempted {
        self.attempts += 1;
        self.operation.attempt().await
    }

    /// Formatted only when a log line asks for it.
    pub fn last_error(&self) -> Option<&dyn Display> {
        self.operation.last_error()
    }

    /// Admitted -> RetryScheduled.
    pub fn schedule_retry(&mut self, retry_count: u32) {
        self.retry_count = retry_count;
        self.transition(ItemState::RetryScheduled);
    }

    /// RetryScheduled -> Queued.
    pub fn requeue(&mut self) {
        self.transition(ItemState::Queued);
    }

    /// Admitted -> Succeeded, delivering the value.
    pub fn succeed(mut self) {
        self.transition(ItemState::Succeeded);
        self.operation.settle();
    }

    /// Admitted -> Failed, delivering the error.
    pub fn fail(mut self) {
        self.transition(ItemState::Failed);
        self.operation.settle();
    }

    fn transition(&mut self, next: ItemState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    fn record_for<F, Fut, T>(make: F) -> (ItemRecord, oneshot::Receiver<Result<T, FetchError>>)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let record = ItemRecord::new(ItemId::new(), Box::new(TypedOperation::new(make, tx)));
        (record, rx)
    }

    #[tokio::test]
    async fn success_is_delivered_on_settle() {
        let (mut record, rx) = record_for(|| async { Ok::<_, FetchError>(7) });
        record.admit();
        assert_eq!(record.attempt().await, Attempted::Succeeded);
        assert_eq!(record.attempts, 1);
        assert!(record.last_error().is_none());
        record.succeed();
        assert_eq!(rx.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn failure_exposes_status_and_message() {
        let (mut record, rx) =
            record_for(|| async { Err::<(), _>(FetchError::status(508, "Loop Detected")) });
        record.admit();
        assert_eq!(
            record.attempt().await,
            Attempted::Failed { status: Some(508) }
        );
        let error = record.last_error().map(|e| e.to_string());
        assert!(error.is_some_and(|e| e.contains("Loop Detected")));
        record.fail();
        assert_eq!(
            rx.await.unwrap(),
            Err(FetchError::status(508, "Loop Detected"))
        );
    }

    #[tokio::test]
    async fn retry_cycle_returns_to_queued() {
        let (mut record, _rx) = record_for(|| async { Ok::<_, FetchError>(()) });
        record.admit();
        record.schedule_retry(1);
        assert_eq!(record.state, ItemState::RetryScheduled);
        record.requeue();
        assert_eq!(record.state, ItemState::Queued);
        assert_eq!(record.retry_count, 1);
    }

    #[tokio::test]
    async fn unsettled_record_closes_the_channel_when_dropped() {
        let (record, rx) = record_for(|| async { Ok::<_, FetchError>(()) });
        drop(record);
        assert!(rx.await.is_err());
    }
}
