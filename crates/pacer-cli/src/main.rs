use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pacer_core::{QueueConfig, ThrottleQueue};
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod upstream;

use upstream::SimulatedUpstream;

/// Render a burst of pages against a fragile upstream through one throttle queue.
#[derive(Debug, Parser)]
#[command(name = "pacer", version)]
struct Args {
    /// TOML queue configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    max_concurrent: Option<usize>,

    #[arg(long)]
    min_delay_ms: Option<u64>,

    #[arg(long)]
    max_retries: Option<u32>,

    /// Pages rendered concurrently.
    #[arg(long, default_value_t = 4)]
    pages: usize,

    /// Fetches each page issues at once.
    #[arg(long, default_value_t = 6)]
    fetches_per_page: usize,

    /// Overlapping calls the upstream survives before answering 508.
    #[arg(long, default_value_t = 3)]
    upstream_capacity: usize,

    #[arg(long, default_value_t = 150)]
    upstream_latency_ms: u64,

    /// Slugs the upstream answers with 404.
    #[arg(long = "missing", value_delimiter = ',')]
    missing: Vec<String>,

    /// Print the final counters as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn queue_config(&self) -> anyhow::Result<QueueConfig> {
        let mut config = match &self.config {
            Some(path) => QueueConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => QueueConfig::default(),
        };
        if let Some(n) = self.max_concurrent {
            config = config.with_max_concurrent(n);
        }
        if let Some(ms) = self.min_delay_ms {
            config = config.with_min_delay(Duration::from_millis(ms));
        }
        if let Some(n) = self.max_retries {
            config = config.with_max_retries(n);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.queue_config()?;
    info!(
        max_concurrent = config.max_concurrent,
        min_delay_ms = config.min_delay.as_millis() as u64,
        max_retries = config.max_retries,
        "starting"
    );

    let queue = ThrottleQueue::new(config)?;
    let upstream = SimulatedUpstream::new(
        args.upstream_capacity,
        Duration::from_millis(args.upstream_latency_ms),
        args.missing.iter().cloned(),
    );

    let mut pages = JoinSet::new();
    for page in 0..args.pages {
        let queue = queue.clone();
        let upstream = upstream.clone();
        let fetches = args.fetches_per_page;
        pages.spawn(async move { render_page(page, fetches, queue, upstream).await });
    }

    let (mut ok, mut failed) = (0usize, 0usize);
    while let Some(joined) = pages.join_next().await {
        let (page_ok, page_failed) = joined.context("page task panicked")?;
        ok += page_ok;
        failed += page_failed;
    }

    let counts = queue.counts();
    info!(
        ok,
        failed,
        upstream_calls = upstream.calls(),
        upstream_overloaded = upstream.overloaded(),
        "done"
    );
    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!("{counts:?}");
    }
    Ok(())
}

/// Issue every fetch of one page at once and wait for all of them.
async fn render_page(
    page: usize,
    fetches: usize,
    queue: ThrottleQueue,
    upstream: SimulatedUpstream,
) -> (usize, usize) {
    let tickets: Vec<_> = (0..fetches)
        .map(|i| {
            let slug = format!("page{page}-{i}");
            let upstream = upstream.clone();
            queue.submit(move || upstream.clone().fetch_article(slug.clone()))
        })
        .collect();

    let (mut ok, mut failed) = (0, 0);
    for ticket in tickets {
        let id = ticket.id();
        match ticket.await {
            Ok(article) => {
                ok += 1;
                tracing::debug!(page, item = %id, slug = %article.slug, title = %article.title, "fetched");
            }
            Err(e) => {
                failed += 1;
                warn!(page, item = %id, error = %e, "fetch failed");
            }
        }
    }
    info!(page, ok, failed, "page rendered");
    (ok, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from(["pacer", "--max-concurrent", "1", "--min-delay-ms", "0"]);
        let config = args.queue_config().unwrap();
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.min_delay, Duration::ZERO);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let args = Args::parse_from(["pacer", "--max-concurrent", "0"]);
        assert!(args.queue_config().is_err());
    }

    #[test]
    fn missing_slugs_are_comma_separated() {
        let args = Args::parse_from(["pacer", "--missing", "a,b"]);
        assert_eq!(args.missing, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn page_within_upstream_capacity_has_no_failures() {
        let queue = ThrottleQueue::new(
            QueueConfig::default()
                .with_max_concurrent(2)
                .with_min_delay(Duration::ZERO),
        )
        .unwrap();
        let upstream = SimulatedUpstream::new(2, Duration::from_millis(50), []);
        let (ok, failed) = render_page(0, 5, queue.clone(), upstream.clone()).await;
        assert_eq!((ok, failed), (5, 0));
        assert_eq!(upstream.overloaded(), 0);
        assert_eq!(queue.counts().retried, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overload_is_absorbed_by_retries() {
        let queue = ThrottleQueue::new(
            QueueConfig::default()
                .with_max_concurrent(3)
                .with_min_delay(Duration::ZERO),
        )
        .unwrap();
        let upstream = SimulatedUpstream::new(2, Duration::from_millis(50), []);
        let (ok, failed) = render_page(0, 3, queue.clone(), upstream.clone()).await;
        assert_eq!((ok, failed), (3, 0));
        assert!(upstream.overloaded() >= 1);
        assert_eq!(queue.counts().retried, upstream.overloaded());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_article_fails_without_retry() {
        let queue = ThrottleQueue::new(
            QueueConfig::default()
                .with_max_concurrent(1)
                .with_min_delay(Duration::ZERO),
        )
        .unwrap();
        let upstream = SimulatedUpstream::new(1, Duration::ZERO, ["page0-1".to_string()]);
        let (ok, failed) = render_page(0, 2, queue.clone(), upstream).await;
        assert_eq!((ok, failed), (1, 1));
        assert_eq!(queue.counts().attempts, 2);
    }
}
