//! The crawl engine
//!
//! `Engine` owns the dedup tracker and the scheduler and drives each admitted
//! resource through fetch, content processing and save. Every per-resource
//! failure, including a panic in an injected hook, is contained in the task
//! that caused it and routed to the error handler.

use crate::crawler::fetcher::Fetcher;
use crate::crawler::scheduler::Scheduler;
use crate::crawler::tracker::{Admission, DedupTracker, KeyStatus, TrackerCounts};
use crate::output::{
    CompletedRecord, ErrorRecord, NotFoundRecord, Reporter, TracingReporter,
};
use crate::pipeline::{LinkContext, Pipeline, Policy};
use crate::process::extract;
use crate::state::{Resource, ResourceState};
use crate::storage::Persister;
use crate::url::normalize_parsed;
use crate::{ConfigError, MirrorError};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// Reacts to a failed resource: `(engine, error, canonical key, resource)`
pub type ErrorFn = Arc<dyn Fn(&Engine, &MirrorError, &Url, &Resource) + Send + Sync>;

/// Called once per `start()` when the queue drains: `(engine, finished)`
pub type SuccessFn = Arc<dyn Fn(&Engine, bool) + Send + Sync>;

/// Maps live queue statistics to a new concurrency limit
pub type AdjustFn = Arc<dyn Fn(&QueueStats) -> usize + Send + Sync>;

/// Engine construction parameters
#[derive(Clone)]
pub struct EngineOptions {
    /// Seed URLs, canonicalized before admission at depth 0
    pub seeds: Vec<String>,
    pub max_depth: u32,
    pub concurrency: usize,
    /// Period of the adaptive concurrency hook; `None` disables it
    pub adjust_period: Option<Duration>,
    pub adjust: Option<AdjustFn>,
    pub on_error: Option<ErrorFn>,
    pub on_success: Option<SuccessFn>,
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("seeds", &self.seeds)
            .field("max_depth", &self.max_depth)
            .field("concurrency", &self.concurrency)
            .field("adjust_period", &self.adjust_period)
            .field("adjust", &self.adjust.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_success", &self.on_success.is_some())
            .finish()
    }
}

impl EngineOptions {
    pub fn new(seeds: Vec<String>, max_depth: u32, concurrency: usize) -> Self {
        Self {
            seeds,
            max_depth,
            concurrency,
            adjust_period: None,
            adjust: None,
            on_error: None,
            on_success: None,
        }
    }

    pub fn adaptive<F>(mut self, period: Duration, adjust: F) -> Self
    where
        F: Fn(&QueueStats) -> usize + Send + Sync + 'static,
    {
        self.adjust_period = Some(period);
        self.adjust = Some(Arc::new(adjust));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Engine, &MirrorError, &Url, &Resource) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Engine, bool) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }
}

/// Live queue statistics, as seen by the adaptive concurrency hook
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub concurrency: usize,
    pub completed: usize,
    pub failed: usize,
    /// Resources completed since the previous adjustment
    pub completed_since_adjust: u64,
    /// Resources failed since the previous adjustment
    pub errors_since_adjust: u64,
}

/// Summary of a run, returned once the queue is idle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub completed: usize,
    pub failed: usize,
    pub not_found: u64,
    pub errors: u64,
    pub elapsed: Duration,
    /// True if the queue drained rather than being superseded by another `start()`
    pub finished: bool,
}

/// Adjuster that shrinks by one when more than half of the recent resources
/// failed and grows by one while work is backlogged, within `[min, max]`
pub fn bounded_adjuster(min: usize, max: usize) -> AdjustFn {
    let min = min.max(1);
    let max = max.max(min);
    Arc::new(move |stats: &QueueStats| {
        let finished = stats.completed_since_adjust + stats.errors_since_adjust;
        let next = if finished > 0 && stats.errors_since_adjust * 2 > finished {
            stats.concurrency.saturating_sub(1)
        } else if stats.pending > stats.concurrency {
            stats.concurrency + 1
        } else {
            stats.concurrency
        };
        next.clamp(min, max)
    })
}

#[derive(Debug, Default)]
struct Counters {
    not_found: AtomicU64,
    errors: AtomicU64,
    completed_since_adjust: AtomicU64,
    errors_since_adjust: AtomicU64,
}

struct EngineInner {
    options: EngineOptions,
    pipeline: Pipeline,
    policy: Policy,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Persister>,
    reporter: Arc<dyn Reporter>,
    tracker: DedupTracker,
    scheduler: Scheduler,
    counters: Counters,
    cycle: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    adjust_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a crawl; cheap to clone and shared with every task
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.inner.options)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Assembles an [`Engine`] from its collaborators
pub struct EngineBuilder {
    options: EngineOptions,
    pipeline: Option<Pipeline>,
    policy: Option<Policy>,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Option<Arc<dyn Persister>>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl EngineBuilder {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            pipeline: None,
            policy: None,
            fetcher: None,
            store: None,
            reporter: None,
        }
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn store(mut self, store: Arc<dyn Persister>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Validates the options and queues the seeds; nothing runs until `start()`
    ///
    /// # Returns
    ///
    /// * `Ok(Engine)` - A paused engine with its seeds queued
    /// * `Err(MirrorError)` - No seeds, zero concurrency, a zero adjust period,
    ///   a missing collaborator, or a seed that does not canonicalize
    pub fn build(self) -> Result<Engine, MirrorError> {
        let options = self.options;
        if options.seeds.is_empty() {
            return Err(ConfigError::MissingSeeds.into());
        }
        if options.concurrency == 0 {
            return Err(ConfigError::Validation("concurrency must be at least 1".to_string()).into());
        }
        if options.adjust_period.is_some_and(|period| period.is_zero()) {
            return Err(
                ConfigError::Validation("adjust period must be greater than zero".to_string())
                    .into(),
            );
        }

        let fetcher = self
            .fetcher
            .ok_or_else(|| ConfigError::Validation("a fetcher is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| ConfigError::Validation("a persister is required".to_string()))?;

        let inner = EngineInner {
            tracker: DedupTracker::new(options.max_depth),
            scheduler: Scheduler::new(options.concurrency),
            pipeline: self.pipeline.unwrap_or_default(),
            policy: self.policy.unwrap_or_default(),
            reporter: self.reporter.unwrap_or_else(|| Arc::new(TracingReporter)),
            fetcher,
            store,
            counters: Counters::default(),
            cycle: AtomicU64::new(0),
            started_at: Mutex::new(None),
            adjust_task: Mutex::new(None),
            options,
        };
        let engine = Engine {
            inner: Arc::new(inner),
        };

        for seed in &engine.inner.options.seeds {
            let resource = engine.seed_resource(seed)?;
            engine.add(resource);
        }

        Ok(engine)
    }
}

impl Engine {
    fn seed_resource(&self, seed: &str) -> Result<Resource, MirrorError> {
        let inner = &self.inner;
        let key = inner
            .pipeline
            .canonicalize(seed, &LinkContext::default())
            .ok_or_else(|| ConfigError::InvalidUrl(seed.to_string()))?;
        let kind = inner.policy.detect(&key, Some("a"));
        let save_path = inner.store.save_path(&key);

        let mut resource = Resource::new(seed, key, kind, 0, None, save_path);
        let key = resource.key.clone();
        inner.policy.init_resource(&mut resource);
        if resource.key != key {
            resource.save_path = inner.store.save_path(&resource.key);
        }
        Ok(resource)
    }

    /// Single admission point for new resources
    ///
    /// Returns false only when the depth bound rejects the resource; a key
    /// that is already known counts as handled.
    pub fn add(&self, resource: Resource) -> bool {
        match self.inner.tracker.admit(&resource.key, resource.depth) {
            Admission::Admitted => {
                debug!(
                    "Queued {} ({}, depth {})",
                    resource.key, resource.kind, resource.depth
                );
                let engine = self.clone();
                self.inner
                    .scheduler
                    .add(async move { engine.run_task(resource).await });
                true
            }
            Admission::AlreadyKnown => true,
            Admission::DepthExceeded => {
                debug!(
                    "Not queueing {}: depth {} exceeds {}",
                    resource.key,
                    resource.depth,
                    self.inner.tracker.max_depth()
                );
                false
            }
        }
    }

    /// Starts dispatching and returns a handle resolving when the queue is idle
    ///
    /// The success callback fires from that handle, once, unless a later
    /// `start()` supersedes this one.
    pub fn start(&self) -> JoinHandle<CrawlOutcome> {
        let cycle = self.inner.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut started_at = lock(&self.inner.started_at);
            if started_at.is_none() {
                *started_at = Some(Instant::now());
            }
        }

        self.spawn_adjuster();
        info!(
            "Starting crawl: {} queued, concurrency {}",
            self.inner.scheduler.stats().pending,
            self.inner.scheduler.concurrency()
        );
        self.inner.scheduler.start();

        let engine = self.clone();
        tokio::spawn(async move {
            engine.inner.scheduler.wait_idle().await;
            let current = engine.inner.cycle.load(Ordering::SeqCst) == cycle;
            let mut outcome = engine.outcome();
            outcome.finished = current;
            if current {
                engine.stop_adjuster();
                engine.finish(&outcome);
            }
            outcome
        })
    }

    /// Stops dispatching new tasks; in-flight tasks run to completion
    pub fn pause(&self) {
        self.inner.scheduler.pause();
        self.stop_adjuster();
        info!("Crawl paused");
    }

    /// Starts the crawl and waits until the queue is idle
    pub async fn run(&self) -> CrawlOutcome {
        match self.start().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Idle watcher failed: {}", e);
                self.outcome()
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        let scheduler = self.inner.scheduler.stats();
        let counts = self.inner.tracker.counts();
        QueueStats {
            pending: scheduler.pending,
            in_flight: scheduler.in_flight,
            concurrency: scheduler.concurrency,
            completed: counts.completed,
            failed: counts.failed,
            completed_since_adjust: self
                .inner
                .counters
                .completed_since_adjust
                .load(Ordering::SeqCst),
            errors_since_adjust: self.inner.counters.errors_since_adjust.load(Ordering::SeqCst),
        }
    }

    pub fn outcome(&self) -> CrawlOutcome {
        let counts = self.inner.tracker.counts();
        let started_at = *lock(&self.inner.started_at);
        let elapsed = started_at.map(|t| t.elapsed()).unwrap_or_default();
        CrawlOutcome {
            completed: counts.completed,
            failed: counts.failed,
            not_found: self.inner.counters.not_found.load(Ordering::SeqCst),
            errors: self.inner.counters.errors.load(Ordering::SeqCst),
            elapsed,
            finished: self.inner.scheduler.is_idle(),
        }
    }

    pub fn status(&self, key: &Url) -> Option<KeyStatus> {
        self.inner.tracker.status(key)
    }

    pub fn counts(&self) -> TrackerCounts {
        self.inner.tracker.counts()
    }

    pub fn set_concurrency(&self, concurrency: usize) {
        self.inner.scheduler.set_concurrency(concurrency);
    }

    fn finish(&self, outcome: &CrawlOutcome) {
        info!(
            "Crawl idle: {} completed, {} failed ({} not found) in {:?}",
            outcome.completed, outcome.failed, outcome.not_found, outcome.elapsed
        );

        if let Err(e) = self.inner.reporter.finish(outcome) {
            warn!("Failed to finalize reports: {}", e);
        }

        if let Some(on_success) = &self.inner.options.on_success {
            let callback = AssertUnwindSafe(|| on_success(self, outcome.finished));
            if std::panic::catch_unwind(callback).is_err() {
                error!("Success callback panicked");
            }
        }
    }

    fn spawn_adjuster(&self) {
        let options = &self.inner.options;
        let (Some(period), Some(adjust)) = (options.adjust_period, options.adjust.clone()) else {
            return;
        };

        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = Engine { inner };
                let stats = engine.stats();
                let next = adjust(&stats).max(1);
                if next != stats.concurrency {
                    info!(
                        "Adjusting concurrency {} -> {} ({} pending, {} errors / {} completed)",
                        stats.concurrency,
                        next,
                        stats.pending,
                        stats.errors_since_adjust,
                        stats.completed_since_adjust
                    );
                    engine.set_concurrency(next);
                }
                engine
                    .inner
                    .counters
                    .completed_since_adjust
                    .store(0, Ordering::SeqCst);
                engine
                    .inner
                    .counters
                    .errors_since_adjust
                    .store(0, Ordering::SeqCst);
            }
        });

        if let Some(previous) = lock(&self.inner.adjust_task).replace(handle) {
            previous.abort();
        }
    }

    fn stop_adjuster(&self) {
        if let Some(handle) = lock(&self.inner.adjust_task).take() {
            handle.abort();
        }
    }

    /// Runs one resource to a terminal state
    async fn run_task(&self, mut resource: Resource) {
        let result = AssertUnwindSafe(self.process(&mut resource))
            .catch_unwind()
            .await;
        let result = result.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            Err(MirrorError::Process {
                url: resource.key.to_string(),
                message,
            })
        });

        if let Err(e) = result {
            self.handle_error(e, resource).await;
        }
    }

    /// Fetch, process, admit children, save
    async fn process(&self, resource: &mut Resource) -> Result<(), MirrorError> {
        let inner = &self.inner;

        resource.transition(ResourceState::Fetching)?;
        let physical = inner.policy.physical_url(&resource.key);
        if physical != resource.key {
            debug!("Fetching {} from {}", resource.key, physical);
        }

        let started = Instant::now();
        let response = inner.fetcher.fetch(&physical).await?;
        resource.download_time = Some(started.elapsed());
        resource.content_type = response.content_type.clone();

        if response.final_url != physical {
            self.record_redirect(resource, &response.final_url);
        }

        // kept on the resource so a failure during processing can still save it
        resource.body = Some(response.body.clone());

        resource.transition(ResourceState::Processing)?;
        let extracted = extract(
            resource,
            &response.body,
            &inner.pipeline,
            &inner.policy,
            inner.store.as_ref(),
        );
        if let Some(rewritten) = extracted.body {
            resource.body = Some(rewritten);
        }
        resource.redirected_body = extracted.redirected_body;

        for child in extracted.other.into_iter().chain(extracted.html) {
            self.add(child);
        }

        resource.transition(ResourceState::Saving)?;
        if resource.begin_save() {
            let saved = inner.store.save(resource).await;
            resource.finish_save(saved.is_ok());
            saved?;
        }

        resource.transition(ResourceState::Completed)?;
        inner.tracker.complete(&resource.keys());
        inner
            .counters
            .completed_since_adjust
            .fetch_add(1, Ordering::SeqCst);

        if let Err(e) = inner
            .reporter
            .completed(&CompletedRecord::from_resource(resource))
        {
            warn!("Failed to report completion of {}: {}", resource.key, e);
        }

        resource.release_payload();
        Ok(())
    }

    /// Records where a fetch ended up and claims that key if nobody owns it
    fn record_redirect(&self, resource: &mut Resource, final_url: &Url) {
        let inner = &self.inner;
        let Some(target) = inner.policy.canonical_redirect(final_url, resource) else {
            return;
        };
        let Ok(target) = normalize_parsed(target, inner.pipeline.normalize_options()) else {
            return;
        };
        if target == resource.key {
            return;
        }

        resource.owns_redirect = inner.tracker.register_alias(&target);
        if resource.owns_redirect {
            resource.redirected_save_path = Some(inner.store.save_path(&target));
        }
        debug!(
            "{} redirected to {}{}",
            resource.key,
            target,
            if resource.owns_redirect { "" } else { " (already known)" }
        );
        resource.redirected = Some(target);
    }

    /// Error callback, best-effort save, mark failed, report
    async fn handle_error(&self, error: MirrorError, mut resource: Resource) {
        let inner = &self.inner;

        if let Some(on_error) = &inner.options.on_error {
            let key = resource.key.clone();
            let callback = AssertUnwindSafe(|| on_error(self, &error, &key, &resource));
            if std::panic::catch_unwind(callback).is_err() {
                error!("Error callback panicked for {}", resource.key);
            }
        }

        if resource.can_best_effort_save() && resource.begin_save() {
            match inner.store.save(&resource).await {
                Ok(()) => {
                    resource.finish_save(true);
                    debug!("Saved partial content of failed {}", resource.key);
                }
                Err(e) => {
                    resource.finish_save(false);
                    warn!("Best-effort save of {} failed: {}", resource.key, e);
                }
            }
        }

        if let Err(e) = resource.transition(ResourceState::Failed) {
            debug!("{}", e);
        }
        inner.tracker.fail(&resource.keys());
        inner
            .counters
            .errors_since_adjust
            .fetch_add(1, Ordering::SeqCst);

        let referrer = resource.referrer.as_ref().map(|r| r.to_string());
        let reported = if error.is_not_found() {
            inner.counters.not_found.fetch_add(1, Ordering::SeqCst);
            inner.reporter.not_found(&NotFoundRecord {
                url: resource.key.to_string(),
                referrer,
            })
        } else {
            inner.counters.errors.fetch_add(1, Ordering::SeqCst);
            inner.reporter.error(&ErrorRecord {
                url: resource.key.to_string(),
                referrer,
                kind: resource.kind,
                status_code: error.status_code(),
                message: error.to_string(),
            })
        };
        if let Err(e) = reported {
            warn!("Failed to report failure of {}: {}", resource.key, e);
        }

        resource.release_payload();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::{FetchError, FetchResponse};
    use crate::output::CollectingReporter;
    use crate::pipeline::Decision;
    use crate::state::ResourceKind;
    use crate::storage::{save_path, StorageResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    /// Serves canned pages and counts hits per URL
    #[derive(Default)]
    struct MockFetcher {
        pages: HashMap<String, (u16, &'static str, String, Option<String>)>,
        hits: Mutex<HashMap<String, usize>>,
        delay: Option<Duration>,
    }

    impl MockFetcher {
        fn page(mut self, url: &str, content_type: &'static str, body: &str) -> Self {
            self.pages
                .insert(url.to_string(), (200, content_type, body.to_string(), None));
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.pages
                .insert(url.to_string(), (status, "text/html", String::new(), None));
            self
        }

        fn redirect(mut self, url: &str, to: &str, body: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                (200, "text/html", body.to_string(), Some(to.to_string())),
            );
            self
        }

        fn hits(&self, url: &str) -> usize {
            self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchResponse, FetchError> {
            *self
                .hits
                .lock()
                .unwrap()
                .entry(url.to_string())
                .or_default() += 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match self.pages.get(url.as_str()) {
                Some((200, content_type, body, final_url)) => Ok(FetchResponse {
                    body: body.clone().into_bytes(),
                    final_url: final_url
                        .as_deref()
                        .map(|u| Url::parse(u).unwrap())
                        .unwrap_or_else(|| url.clone()),
                    status: 200,
                    content_type: Some(content_type.to_string()),
                }),
                Some((status, ..)) => Err(FetchError::Http {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(FetchError::Http {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }

    /// Records saves in memory
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl Persister for MemoryStore {
        fn save_path(&self, key: &Url) -> PathBuf {
            save_path(&PathBuf::from("/m"), key)
        }

        async fn save(&self, resource: &Resource) -> StorageResult<()> {
            self.saved.lock().unwrap().push(resource.key.clone());
            Ok(())
        }
    }

    struct Harness {
        engine: Engine,
        fetcher: Arc<MockFetcher>,
        store: Arc<MemoryStore>,
        reporter: Arc<CollectingReporter>,
    }

    fn harness(options: EngineOptions, fetcher: MockFetcher, policy: Policy) -> Harness {
        let fetcher = Arc::new(fetcher);
        let store = Arc::new(MemoryStore::default());
        let reporter = Arc::new(CollectingReporter::default());
        let engine = EngineBuilder::new(options)
            .policy(policy)
            .fetcher(fetcher.clone())
            .store(store.clone())
            .reporter(reporter.clone())
            .build()
            .unwrap();
        Harness {
            engine,
            fetcher,
            store,
            reporter,
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_depth_bound_admits_one_child() {
        let fetcher = MockFetcher::default()
            .page("https://e.com/", "text/html", r#"<a href="/a">a</a>"#)
            .page("https://e.com/a", "text/html", r#"<a href="/b">b</a>"#)
            .page("https://e.com/b", "text/html", "deep");
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 1, 2),
            fetcher,
            Policy::default(),
        );

        let outcome = h.engine.run().await;

        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(h.fetcher.hits("https://e.com/a"), 1);
        assert_eq!(h.fetcher.hits("https://e.com/b"), 0);
        assert_eq!(h.engine.status(&url("https://e.com/b")), None);
    }

    #[tokio::test]
    async fn test_shared_child_fetched_once() {
        let mut fetcher = MockFetcher::default()
            .page(
                "https://e.com/",
                "text/html",
                r#"<a href="/p1">1</a><a href="/p2">2</a>"#,
            )
            .page("https://e.com/p1", "text/html", r#"<a href="/x">x</a>"#)
            .page("https://e.com/p2", "text/html", r#"<a href="/x">x</a>"#)
            .page("https://e.com/x", "text/html", "shared");
        fetcher.delay = Some(Duration::from_millis(5));
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 5, 4),
            fetcher,
            Policy::default(),
        );

        let outcome = h.engine.run().await;

        assert_eq!(h.fetcher.hits("https://e.com/x"), 1);
        assert_eq!(outcome.completed, 4);
        assert_eq!(h.store.saved.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_add_schedules_once() {
        let fetcher = MockFetcher::default()
            .page("https://e.com/", "text/html", "")
            .page("https://e.com/x", "text/html", "");
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 5, 4),
            fetcher,
            Policy::default(),
        );

        let key = url("https://e.com/x");
        let adds: Vec<_> = (0..8)
            .map(|_| {
                let engine = h.engine.clone();
                let resource = Resource::new(
                    "/x",
                    key.clone(),
                    ResourceKind::Html,
                    1,
                    None,
                    PathBuf::from("/m/e.com/x.html"),
                );
                tokio::spawn(async move { engine.add(resource) })
            })
            .collect();
        for add in adds {
            assert!(add.await.unwrap());
        }

        h.engine.run().await;
        assert_eq!(h.fetcher.hits("https://e.com/x"), 1);
    }

    #[tokio::test]
    async fn test_not_found_routed_to_its_own_stream() {
        let fetcher = MockFetcher::default()
            .page("https://e.com/", "text/html", r#"<a href="/missing">m</a>"#)
            .status("https://e.com/missing", 404);
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 3, 2),
            fetcher,
            Policy::default(),
        );

        let outcome = h.engine.run().await;

        assert_eq!(outcome.not_found, 1);
        assert_eq!(outcome.errors, 0);
        assert_eq!(
            h.engine.status(&url("https://e.com/missing")),
            Some(KeyStatus::Failed)
        );
        let not_found = h.reporter.not_found_records();
        assert_eq!(not_found.len(), 1);
        assert_eq!(not_found[0].url, "https://e.com/missing");
        assert_eq!(not_found[0].referrer.as_deref(), Some("https://e.com/"));
        assert!(h.reporter.error_records().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_reported_generally() {
        let fetcher = MockFetcher::default()
            .page("https://e.com/", "text/html", r#"<img src="/broken.png">"#)
            .status("https://e.com/broken.png", 500);
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 3, 2),
            fetcher,
            Policy::default(),
        );

        let outcome = h.engine.run().await;

        assert_eq!(outcome.errors, 1);
        let errors = h.reporter.error_records();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].status_code, Some(500));
        assert_eq!(errors[0].kind, ResourceKind::Binary);
    }

    #[tokio::test]
    async fn test_stylesheet_children_resolved_against_stylesheet() {
        let fetcher = MockFetcher::default()
            .page(
                "https://e.com/",
                "text/html",
                r#"<link rel="stylesheet" href="/css/site.css">"#,
            )
            .page(
                "https://e.com/css/site.css",
                "text/css",
                "@import 'base.css';\nbody { background: url(img.png) }",
            )
            .page("https://e.com/css/base.css", "text/css", "p { color: red }")
            .page("https://e.com/css/img.png", "image/png", "PNG");
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 5, 2),
            fetcher,
            Policy::default(),
        );

        let outcome = h.engine.run().await;

        assert_eq!(outcome.completed, 4);
        assert_eq!(h.fetcher.hits("https://e.com/css/base.css"), 1);
        assert_eq!(h.fetcher.hits("https://e.com/css/img.png"), 1);
    }

    #[tokio::test]
    async fn test_redirect_aliases_completed_together() {
        let fetcher = MockFetcher::default()
            .page("https://e.com/", "text/html", r#"<a href="/old">old</a>"#)
            .redirect(
                "https://e.com/old",
                "https://e.com/new",
                r#"<a href="/new">self</a>"#,
            )
            .page("https://e.com/new", "text/html", "should not be fetched");
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 5, 1),
            fetcher,
            Policy::default(),
        );

        h.engine.run().await;

        assert_eq!(h.fetcher.hits("https://e.com/new"), 0);
        assert_eq!(
            h.engine.status(&url("https://e.com/old")),
            Some(KeyStatus::Completed)
        );
        assert_eq!(
            h.engine.status(&url("https://e.com/new")),
            Some(KeyStatus::Completed)
        );
    }

    #[tokio::test]
    async fn test_panicking_hook_is_isolated() {
        let fetcher = MockFetcher::default()
            .page(
                "https://e.com/",
                "text/html",
                r#"<a href="/boom">boom</a><a href="/fine">fine</a>"#,
            )
            .page("https://e.com/boom", "text/html", "BOOM")
            .page("https://e.com/fine", "text/html", "fine");
        let policy = Policy::default().pre_process_html(|resource: &Resource, html: String| {
            if html.contains("BOOM") {
                panic!("hook failed on {}", resource.key);
            }
            html
        });

        let errors = Arc::new(AtomicUsize::new(0));
        let successes = Arc::new(AtomicUsize::new(0));
        let options = EngineOptions::new(vec!["https://e.com/".into()], 3, 2)
            .on_error({
                let errors = errors.clone();
                move |_: &Engine, _: &MirrorError, _: &Url, _: &Resource| {
                    errors.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_success({
                let successes = successes.clone();
                move |_: &Engine, finished: bool| {
                    assert!(finished);
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            });
        let h = harness(options, fetcher, policy);

        let outcome = h.engine.run().await;

        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.engine.status(&url("https://e.com/boom")),
            Some(KeyStatus::Failed)
        );
        // the fetched body is still written by the best-effort save
        assert!(h
            .store
            .saved
            .lock()
            .unwrap()
            .contains(&url("https://e.com/boom")));
    }

    #[tokio::test]
    async fn test_vetoed_links_never_fetched() {
        let fetcher = MockFetcher::default().page(
            "https://e.com/",
            "text/html",
            r#"<a href="/private/x">x</a>"#,
        );
        let policy = Policy::default().drop_resource(|r: &Resource| {
            if r.key.path().starts_with("/private/") {
                Decision::Drop
            } else {
                Decision::Defer
            }
        });
        let h = harness(
            EngineOptions::new(vec!["https://e.com/".into()], 3, 1),
            fetcher,
            policy,
        );

        h.engine.run().await;
        assert_eq!(h.fetcher.hits("https://e.com/private/x"), 0);
        assert_eq!(h.engine.status(&url("https://e.com/private/x")), None);
    }

    #[tokio::test]
    async fn test_build_requires_seeds_and_collaborators() {
        let err = EngineBuilder::new(EngineOptions::new(vec![], 1, 1))
            .fetcher(Arc::new(MockFetcher::default()))
            .store(Arc::new(MemoryStore::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, MirrorError::Config(ConfigError::MissingSeeds)));

        let err = EngineBuilder::new(EngineOptions::new(vec!["https://e.com/".into()], 1, 1))
            .build()
            .unwrap_err();
        assert!(matches!(err, MirrorError::Config(ConfigError::Validation(_))));

        let err = EngineBuilder::new(EngineOptions::new(vec!["mailto:x@e.com".into()], 1, 1))
            .fetcher(Arc::new(MockFetcher::default()))
            .store(Arc::new(MemoryStore::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, MirrorError::Config(ConfigError::InvalidUrl(_))));
    }

    /// Polls until `done` holds, failing after about a second
    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_pause_then_restart_supersedes_first_cycle() {
        let mut fetcher = MockFetcher::default()
            .page(
                "https://e.com/",
                "text/html",
                r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a>"#,
            )
            .page("https://e.com/a", "text/html", "a")
            .page("https://e.com/b", "text/html", "b")
            .page("https://e.com/c", "text/html", "c");
        fetcher.delay = Some(Duration::from_millis(20));

        let successes = Arc::new(AtomicUsize::new(0));
        let finished_flags = Arc::new(Mutex::new(Vec::new()));
        let options = EngineOptions::new(vec!["https://e.com/".into()], 3, 1).on_success({
            let successes = successes.clone();
            let finished_flags = finished_flags.clone();
            move |_: &Engine, finished: bool| {
                successes.fetch_add(1, Ordering::SeqCst);
                finished_flags.lock().unwrap().push(finished);
            }
        });
        let h = harness(options, fetcher, Policy::default());

        let first = h.engine.start();
        wait_until(|| h.fetcher.hits("https://e.com/") == 1).await;
        h.engine.pause();
        wait_until(|| h.engine.counts().completed == 1).await;

        // paused with the children queued: nothing new is dispatched
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(h.engine.stats().pending, 3);
        assert_eq!(h.engine.stats().in_flight, 0);
        assert_eq!(h.fetcher.hits("https://e.com/a"), 0);
        assert_eq!(successes.load(Ordering::SeqCst), 0);

        let second = h.engine.start();
        let second = second.await.unwrap();
        let first = first.await.unwrap();

        assert!(second.finished);
        assert!(!first.finished);
        assert_eq!(second.completed, 4);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(*finished_flags.lock().unwrap(), vec![true]);
        for page in ["https://e.com/a", "https://e.com/b", "https://e.com/c"] {
            assert_eq!(h.fetcher.hits(page), 1);
        }
    }

    #[tokio::test]
    async fn test_adjuster_changes_concurrency_while_running() {
        let mut fetcher = MockFetcher::default().page(
            "https://e.com/",
            "text/html",
            r#"<a href="/a">a</a><a href="/b">b</a><a href="/c">c</a><a href="/d">d</a>"#,
        );
        for page in ["a", "b", "c", "d"] {
            fetcher = fetcher.page(&format!("https://e.com/{}", page), "text/html", page);
        }
        fetcher.delay = Some(Duration::from_millis(30));

        let calls = Arc::new(AtomicUsize::new(0));
        let options = EngineOptions::new(vec!["https://e.com/".into()], 3, 1).adaptive(
            Duration::from_millis(10),
            {
                let calls = calls.clone();
                move |_: &QueueStats| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    3
                }
            },
        );
        let h = harness(options, fetcher, Policy::default());
        assert_eq!(h.engine.stats().concurrency, 1);

        let outcome = h.engine.run().await;

        assert!(outcome.finished);
        assert_eq!(outcome.completed, 5);
        assert!(calls.load(Ordering::SeqCst) > 0);
        assert_eq!(h.engine.stats().concurrency, 3);
        // the adjuster stops with the cycle that started it
        assert!(lock(&h.engine.inner.adjust_task).is_none());
    }

    #[tokio::test]
    async fn test_build_rejects_zero_adjust_period() {
        let options = EngineOptions::new(vec!["https://e.com/".into()], 1, 1)
            .adaptive(Duration::ZERO, |stats: &QueueStats| stats.concurrency);
        let err = EngineBuilder::new(options)
            .fetcher(Arc::new(MockFetcher::default()))
            .store(Arc::new(MemoryStore::default()))
            .build()
            .unwrap_err();
        assert!(matches!(err, MirrorError::Config(ConfigError::Validation(_))));
    }

    #[test]
    fn test_bounded_adjuster() {
        let adjust = bounded_adjuster(2, 6);
        let base = QueueStats {
            concurrency: 4,
            ..QueueStats::default()
        };

        let failing = QueueStats {
            completed_since_adjust: 1,
            errors_since_adjust: 3,
            ..base
        };
        assert_eq!(adjust(&failing), 3);

        let backlogged = QueueStats {
            pending: 20,
            completed_since_adjust: 5,
            ..base
        };
        assert_eq!(adjust(&backlogged), 5);

        assert_eq!(adjust(&base), 4);

        let at_floor = QueueStats {
            concurrency: 2,
            errors_since_adjust: 5,
            ..base
        };
        assert_eq!(adjust(&at_floor), 2);
    }
}
