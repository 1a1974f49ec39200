//! Simulated content API that falls over under concurrent load.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use pacer_core::FetchError;

#[derive(Debug, Clone)]
pub struct Article {
    pub slug: String,
    pub title: String,
}

/// Upstream that answers 508 whenever more than `capacity` calls overlap.
#[derive(Clone)]
pub struct SimulatedUpstream {
    inner: Arc<UpstreamInner>,
}

struct UpstreamInner {
    capacity: usize,
    latency: Duration,
    missing: HashSet<String>,
    in_flight: AtomicUsize,
    calls: AtomicU64,
    overloaded: AtomicU64,
}

impl SimulatedUpstream {
    pub fn new(capacity: usize, latency: Duration, missing: impl IntoIterator<Item = String>) -> Self {
        Self {
            inner: Arc::new(UpstreamInner {
                capacity,
                latency,
                missing: missing.into_iter().collect(),
                in_flight: AtomicUsize::new(0),
                calls: AtomicU64::new(0),
                overloaded: AtomicU64::new(0),
            }),
        }
    }

    pub async fn fetch_article(self, slug: String) -> Result<Article, FetchError> {
        let inner = &self.inner;
        inner.calls.fetch_add(1, Ordering::Relaxed);
        let load = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(inner.latency).await;
        inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if load > inner.capacity {
            inner.overloaded.fetch_add(1, Ordering::Relaxed);
            return Err(FetchError::status(508, "Loop Detected"));
        }
        if inner.missing.contains(&slug) {
            return Err(FetchError::status(404, format!("no article {slug}")));
        }
        Ok(Article {
            title: format!("Article {slug}"),
            slug,
        })
    }

    pub fn calls(&self) -> u64 {
        self.inner.calls.load(Ordering::Relaxed)
    }

    pub fn overloaded(&self) -> u64 {
        self.inner.overloaded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn answers_within_capacity() {
        let upstream = SimulatedUpstream::new(1, Duration::from_millis(10), []);
        let article = upstream.clone().fetch_article("a".into()).await.unwrap();
        assert_eq!(article.slug, "a");
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_calls_beyond_capacity_get_508() {
        let upstream = SimulatedUpstream::new(1, Duration::from_millis(10), []);
        let (a, b) = tokio::join!(
            upstream.clone().fetch_article("a".into()),
            upstream.clone().fetch_article("b".into()),
        );
        assert!(a.is_ok());
        assert_eq!(b.unwrap_err(), FetchError::status(508, "Loop Detected"));
        assert_eq!(upstream.overloaded(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_articles_are_404() {
        let upstream = SimulatedUpstream::new(1, Duration::ZERO, ["gone".to_string()]);
        let err = upstream.fetch_article("gone".into()).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { code: 404, .. }));
    }
}
