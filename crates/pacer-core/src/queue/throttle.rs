//! The throttle queue: bounded concurrency, paced admission, retry on overload.

use std::collections::VecDeque;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info, warn};

use super::pacer::Pacer;
use super::record::{Attempted, ItemRecord, TypedOperation};
use super::{QueueConfig, Ticket};
use crate::domain::{Decision, ItemId};
use crate::error::{BuildError, UpstreamStatus};
use crate::observability::QueueCounts;

/// Throttles operations against a fragile upstream.
///
/// At most `max_concurrent` operations hold a slot at once, every invocation
/// is paced by `min_delay`, and failures with a retryable upstream status are
/// put back at the head of the buffer after an exponential backoff.
///
/// Cloning is cheap and every clone drives the same queue. Build one at
/// startup and hand clones to every consumer.
///
/// ```ignore
/// let queue = ThrottleQueue::new(QueueConfig::default())?;
/// let article = queue.submit(move || client.clone().fetch_article(slug.clone())).await?;
/// ```
#[derive(Clone)]
pub struct ThrottleQueue {
    inner: Arc<Inner>,
}

struct Inner {
    config: QueueConfig,
    runtime: Handle,
    state: Mutex<QueueState>,
}

/// Shared mutable state. The mutex is never held across an `.await`.
struct QueueState {
    /// Items waiting for a slot. Fresh work at the back, retries at the front.
    buffer: VecDeque<ItemRecord>,

    /// Slots held by admitted items of the current epoch.
    active: usize,

    /// Bumped by `drain`; slots from an older epoch are no longer counted.
    epoch: u64,

    pacer: Pacer,
    counts: QueueCounts,
}

impl ThrottleQueue {
    /// Build a queue on the current tokio runtime.
    pub fn new(config: QueueConfig) -> Result<Self, BuildError> {
        let runtime = Handle::try_current().map_err(|_| BuildError::NoRuntime)?;
        Self::with_runtime(config, runtime)
    }

    /// Build a queue whose admitted operations run on `runtime`.
    pub fn with_runtime(config: QueueConfig, runtime: Handle) -> Result<Self, BuildError> {
        config.validate()?;
        let state = QueueState {
            buffer: VecDeque::new(),
            active: 0,
            epoch: 0,
            pacer: Pacer::new(config.min_delay),
            counts: QueueCounts::default(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                runtime,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Queue an operation and return the ticket for its eventual result.
    ///
    /// Never blocks and never fails: the outcome, including the operation's
    /// final error, arrives through the ticket. `operation` may be invoked
    /// several times if it fails with a retryable upstream status.
    pub fn submit<F, Fut, T, E>(&self, operation: F) -> Ticket<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: UpstreamStatus + Display + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let id = ItemId::new();
        let record = ItemRecord::new(id, Box::new(TypedOperation::new(operation, tx)));
        {
            let mut state = self.inner.lock();
            state.buffer.push_back(record);
            state.counts.submitted += 1;
            debug!(item = %id, pending = state.buffer.len(), in_flight = state.active, "submitted");
        }
        self.inner.pump();
        Ticket::new(id, rx)
    }

    /// Discard every buffered item and reset the in-flight count to zero.
    ///
    /// In-flight operations keep running and their tickets still settle.
    /// Tickets of discarded items never settle. Returns how many were
    /// discarded.
    pub fn drain(&self) -> usize {
        let discarded = {
            let mut state = self.inner.lock();
            let discarded = std::mem::take(&mut state.buffer);
            state.active = 0;
            state.epoch += 1;
            state.counts.abandoned += discarded.len() as u64;
            discarded
        };
        let abandoned = discarded.len();
        // Dropped outside the lock: operations may own arbitrary state.
        drop(discarded);
        info!(abandoned, "queue drained");
        abandoned
    }

    /// Number of items waiting in the buffer.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().buffer.len()
    }

    /// Number of admitted items currently holding a slot.
    pub fn in_flight_count(&self) -> usize {
        self.inner.lock().active
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.inner.lock();
        QueueCounts {
            pending: state.buffer.len(),
            in_flight: state.active,
            ..state.counts.clone()
        }
    }
}

impl std::fmt::Debug for ThrottleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleQueue")
            .field("config", &self.inner.config)
            .field("counts", &self.counts())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit items while capacity allows.
    ///
    /// The capacity check, the head pop and the slot increment happen under
    /// one lock, so concurrent triggers can never over-admit. Runs after every
    /// submission and, via `Slot::drop`, after every completion.
    fn pump(self: &Arc<Self>) {
        loop {
            let (record, slot, start_at) = {
                let mut state = self.lock();
                if state.active >= self.config.max_concurrent {
                    return;
                }
                let Some(mut record) = state.buffer.pop_front() else {
                    return;
                };
                state.active += 1;
                record.admit();
                let start_at = state.pacer.reserve(Instant::now());
                let slot = Slot {
                    inner: Arc::clone(self),
                    epoch: state.epoch,
                };
                debug!(
                    item = %record.id,
                    retry_count = record.retry_count,
                    pending = state.buffer.len(),
                    in_flight = state.active,
                    "admitted"
                );
                (record, slot, start_at)
            };

            let span = debug_span!("admission", item = %record.id);
            self.runtime.spawn(
                Arc::clone(self)
                    .run(record, slot, start_at)
                    .instrument(span),
            );
        }
    }

    /// Drive one admitted item to success, failure, or a re-queue.
    async fn run(self: Arc<Self>, mut record: ItemRecord, slot: Slot, start_at: Instant) {
        if start_at > Instant::now() {
            tokio::time::sleep_until(start_at).await;
        }

        self.lock().counts.attempts += 1;
        let attempted = record.attempt().await;

        match attempted {
            Attempted::Succeeded => {
                self.lock().counts.succeeded += 1;
                debug!(
                    attempts = record.attempts,
                    elapsed_ms = record.submitted_at.elapsed().as_millis() as u64,
                    "succeeded"
                );
                record.succeed();
            }
            Attempted::Failed { status } => {
                let decision =
                    self.config
                        .retry
                        .decide(record.retry_count, self.config.max_retries, status);
                match decision {
                    Decision::Retry { retry_count, delay } => {
                        warn!(
                            attempt = retry_count,
                            max_retries = self.config.max_retries,
                            backoff_ms = delay.as_millis() as u64,
                            status = ?status,
                            error = record.last_error().map(display),
                            "retrying request"
                        );
                        record.schedule_retry(retry_count);
                        self.lock().counts.retried += 1;

                        // The slot stays held for the whole backoff.
                        tokio::time::sleep(delay).await;

                        record.requeue();
                        self.lock().buffer.push_front(record);
                    }
                    Decision::Fail { reason } => {
                        self.lock().counts.failed += 1;
                        warn!(
                            attempts = record.attempts,
                            status = ?status,
                            %reason,
                            error = record.last_error().map(display),
                            "request failed"
                        );
                        record.fail();
                    }
                }
            }
        }

        drop(slot);
    }
}

/// A held concurrency slot.
///
/// Dropping it frees the slot and schedules admission, including when the
/// operation panics and the task unwinds.
///
/// Admission runs as its own task rather than inside `drop`: during runtime
/// shutdown tokio drops freshly spawned futures on the spot, and admitting
/// from here would recurse once per buffered item.
struct Slot {
    inner: Arc<Inner>,
    epoch: u64,
}

impl Drop for Slot {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            if state.epoch == self.epoch {
                state.active = state.active.saturating_sub(1);
            }
        }
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move { inner.pump() });
    }
}
