//! Caller-side handle of a submitted operation.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::domain::ItemId;

/// Future returned by [`ThrottleQueue::submit`](super::ThrottleQueue::submit).
///
/// Resolves exactly once, to the operation's value or to its final error
/// (unwrapped, after any internal retries).
///
/// A ticket whose item was discarded by [`drain`](super::ThrottleQueue::drain)
/// never resolves. Callers that need a bound should wrap it in
/// `tokio::time::timeout`.
#[must_use = "tickets do nothing unless awaited"]
pub struct Ticket<T, E> {
    id: ItemId,
    rx: oneshot::Receiver<Result<T, E>>,
    abandoned: bool,
}

impl<T, E> Ticket<T, E> {
    pub(crate) fn new(id: ItemId, rx: oneshot::Receiver<Result<T, E>>) -> Self {
        Self {
            id,
            rx,
            abandoned: false,
        }
    }

    /// Id of the queued item, as it appears in log output.
    pub fn id(&self) -> ItemId {
        self.id
    }
}

impl<T, E> Future for Ticket<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.abandoned {
            return Poll::Pending;
        }
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without settling: the item was discarded.
            Poll::Ready(Err(_)) => {
                this.abandoned = true;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> fmt::Debug for Ticket<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.id)
            .field("abandoned", &self.abandoned)
            .finish()
    }
}
