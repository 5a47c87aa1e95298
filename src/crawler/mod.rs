//! Crawler module: the engine and its collaborators
//!
//! This module contains the core mirroring logic, including:
//! - HTTP fetching (`Fetcher`, `HttpFetcher`)
//! - Deduplication of canonical keys (`DedupTracker`)
//! - Bounded-concurrency dispatch (`Scheduler`)
//! - The per-resource fetch/process/save flow (`Engine`)

mod engine;
mod fetcher;
mod scheduler;
mod tracker;

pub use engine::{
    bounded_adjuster, AdjustFn, CrawlOutcome, Engine, EngineBuilder, EngineOptions, ErrorFn,
    QueueStats, SuccessFn,
};
pub use fetcher::{build_http_client, FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use scheduler::{Scheduler, SchedulerStats};
pub use tracker::{Admission, DedupTracker, KeyStatus, TrackerCounts};

use crate::config::{Config, CrawlerConfig};
use crate::output::Reporter;
use crate::pipeline::RuleSet;
use crate::storage::FsStore;
use crate::MirrorError;
use std::sync::Arc;
use std::time::Duration;

impl EngineOptions {
    /// Options from the `[crawler]` section; a non-zero adaptive period
    /// enables the bounded adjuster
    pub fn from_config(config: &CrawlerConfig) -> Self {
        let mut options = Self::new(config.seeds.clone(), config.max_depth, config.concurrency);
        if let Some(period) = config.adaptive_period_ms.filter(|ms| *ms > 0) {
            options.adjust_period = Some(Duration::from_millis(period));
            options.adjust = Some(bounded_adjuster(
                config.min_concurrency,
                config.max_concurrency,
            ));
        }
        options
    }
}

/// Builds a paused engine wired to the network and the local mirror
///
/// # Arguments
///
/// * `config` - The mirror configuration
/// * `reporter` - Sink for the completed / not-found / error streams
///
/// # Returns
///
/// * `Ok(Engine)` - Engine with its seeds queued
/// * `Err(MirrorError)` - Invalid rules, request settings or seeds
pub fn engine_from_config(
    config: &Config,
    reporter: Arc<dyn Reporter>,
) -> Result<Engine, MirrorError> {
    let rules = RuleSet::from_config(&config.rules, &config.crawler.seeds)?;
    let fetcher = HttpFetcher::from_config(&config.request)?;
    let store = FsStore::new(&config.mirror.local_root);

    EngineBuilder::new(EngineOptions::from_config(&config.crawler))
        .pipeline(rules.pipeline)
        .policy(rules.policy)
        .fetcher(Arc::new(fetcher))
        .store(Arc::new(store))
        .reporter(reporter)
        .build()
}

/// Runs a complete mirror operation
///
/// # Arguments
///
/// * `config` - The mirror configuration
/// * `reporter` - Sink for the report streams
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - The queue drained
/// * `Err(MirrorError)` - The engine could not be built
///
/// # Example
///
/// ```no_run
/// use sumi_mirror::config::load_config;
/// use sumi_mirror::crawler::crawl;
/// use sumi_mirror::output::TracingReporter;
/// use std::path::Path;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("mirror.toml"))?;
/// let outcome = crawl(&config, Arc::new(TracingReporter)).await?;
/// println!("{} resources mirrored", outcome.completed);
/// # Ok(())
/// # }
/// ```
pub async fn crawl(
    config: &Config,
    reporter: Arc<dyn Reporter>,
) -> Result<CrawlOutcome, MirrorError> {
    let engine = engine_from_config(config, reporter)?;
    Ok(engine.run().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[test]
    fn test_options_from_config() {
        let config = parse_config(
            r#"
            [crawler]
            seeds = ["https://example.com/"]
            max-depth = 3
            concurrency = 4
            adaptive-period-ms = 500
            min-concurrency = 2
            max-concurrency = 8

            [mirror]
            local-root = "./mirror"
            "#,
        )
        .unwrap();

        let options = EngineOptions::from_config(&config.crawler);
        assert_eq!(options.max_depth, 3);
        assert_eq!(options.concurrency, 4);
        assert_eq!(options.adjust_period, Some(Duration::from_millis(500)));
        assert!(options.adjust.is_some());
    }

    #[test]
    fn test_zero_period_disables_adjuster() {
        let crawler = CrawlerConfig {
            seeds: vec!["https://example.com/".to_string()],
            max_depth: 1,
            concurrency: 2,
            adaptive_period_ms: Some(0),
            min_concurrency: 1,
            max_concurrency: 4,
        };

        let options = EngineOptions::from_config(&crawler);
        assert!(options.adjust_period.is_none());
        assert!(options.adjust.is_none());
    }

    #[tokio::test]
    async fn test_engine_from_config_queues_seeds() {
        let config = parse_config(
            r#"
            [crawler]
            seeds = ["https://example.com/", "https://example.com/docs/"]
            max-depth = 2
            concurrency = 2

            [mirror]
            local-root = "./mirror"
            "#,
        )
        .unwrap();

        let engine =
            engine_from_config(&config, Arc::new(crate::output::TracingReporter)).unwrap();
        assert_eq!(engine.stats().pending, 2);
        assert_eq!(engine.counts().queued, 2);
    }
}
