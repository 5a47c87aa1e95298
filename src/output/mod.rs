//! Output module for report streams and run summaries
//!
//! This module handles:
//! - The three append-only report streams (completed, not found, error)
//! - Recording those streams to logs, memory or the report database
//! - Generating statistics and markdown summaries of a run

mod markdown;
mod sqlite_output;
pub mod stats;
mod traits;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use sqlite_output::SqliteReporter;
pub use stats::{load_statistics, print_statistics, MirrorStatistics};
pub use traits::{
    CompletedRecord, ErrorRecord, NotFoundRecord, OutputError, OutputResult, Reporter,
};

use crate::crawler::CrawlOutcome;
use crate::storage::{EventRecord, NotFoundSummary, ReportStore};
use crate::MirrorError;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

/// Maximum number of not-found URLs listed in a summary
const SUMMARY_NOT_FOUND_LIMIT: usize = 100;

/// Maximum number of errors listed in a summary
const SUMMARY_ERROR_LIMIT: usize = 100;

/// Emits each record as a log event under its own target
///
/// Targets: `sumi_mirror::complete`, `sumi_mirror::not_found`, `sumi_mirror::error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn completed(&self, record: &CompletedRecord) -> OutputResult<()> {
        info!(
            target: "sumi_mirror::complete",
            url = %record.url,
            kind = %record.kind,
            depth = record.depth,
            path = %record.save_path.display(),
            "Saved"
        );
        Ok(())
    }

    fn not_found(&self, record: &NotFoundRecord) -> OutputResult<()> {
        warn!(
            target: "sumi_mirror::not_found",
            url = %record.url,
            referrer = record.referrer.as_deref().unwrap_or("-"),
            "Not found"
        );
        Ok(())
    }

    fn error(&self, record: &ErrorRecord) -> OutputResult<()> {
        error!(
            target: "sumi_mirror::error",
            url = %record.url,
            referrer = record.referrer.as_deref().unwrap_or("-"),
            kind = %record.kind,
            "{}",
            record.message
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Collected {
    completed: Vec<CompletedRecord>,
    not_found: Vec<NotFoundRecord>,
    errors: Vec<ErrorRecord>,
    outcome: Option<CrawlOutcome>,
}

/// Keeps every record in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    records: Mutex<Collected>,
}

impl CollectingReporter {
    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn completed_records(&self) -> Vec<CompletedRecord> {
        self.lock().completed.clone()
    }

    pub fn not_found_records(&self) -> Vec<NotFoundRecord> {
        self.lock().not_found.clone()
    }

    pub fn error_records(&self) -> Vec<ErrorRecord> {
        self.lock().errors.clone()
    }

    /// Outcome passed to `finish`, if the run has reached idle
    pub fn outcome(&self) -> Option<CrawlOutcome> {
        self.lock().outcome
    }
}

impl Reporter for CollectingReporter {
    fn completed(&self, record: &CompletedRecord) -> OutputResult<()> {
        self.lock().completed.push(record.clone());
        Ok(())
    }

    fn not_found(&self, record: &NotFoundRecord) -> OutputResult<()> {
        self.lock().not_found.push(record.clone());
        Ok(())
    }

    fn error(&self, record: &ErrorRecord) -> OutputResult<()> {
        self.lock().errors.push(record.clone());
        Ok(())
    }

    fn finish(&self, outcome: &CrawlOutcome) -> OutputResult<()> {
        self.lock().outcome = Some(*outcome);
        Ok(())
    }
}

/// Forwards every record to each inner reporter
///
/// All reporters see every record; the first failure is returned.
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn Reporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    fn each<F>(&self, f: F) -> OutputResult<()>
    where
        F: Fn(&dyn Reporter) -> OutputResult<()>,
    {
        let mut first_error = None;
        for reporter in &self.reporters {
            if let Err(e) = f(reporter.as_ref()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Reporter for FanoutReporter {
    fn completed(&self, record: &CompletedRecord) -> OutputResult<()> {
        self.each(|r| r.completed(record))
    }

    fn not_found(&self, record: &NotFoundRecord) -> OutputResult<()> {
        self.each(|r| r.not_found(record))
    }

    fn error(&self, record: &ErrorRecord) -> OutputResult<()> {
        self.each(|r| r.error(record))
    }

    fn finish(&self, outcome: &CrawlOutcome) -> OutputResult<()> {
        self.each(|r| r.finish(outcome))
    }
}

/// Summary of one run, as read back from the report database
#[derive(Debug, Clone, Default)]
pub struct MirrorSummary {
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,
    pub completed: u64,
    pub not_found: u64,
    pub errors: u64,
    pub top_not_found: Vec<NotFoundSummary>,
    pub recent_errors: Vec<EventRecord>,
}

impl MirrorSummary {
    /// Share of finished resources that were saved, in percent
    pub fn success_rate(&self) -> f64 {
        let total = self.completed + self.not_found + self.errors;
        if total == 0 {
            0.0
        } else {
            (self.completed as f64 / total as f64) * 100.0
        }
    }
}

/// Generates a summary of a run from the report database
///
/// # Arguments
///
/// * `store` - The report backend
/// * `run_id` - The run to summarize; `None` picks the latest run
///
/// # Returns
///
/// * `Ok(MirrorSummary)` - Successfully generated summary
/// * `Err(MirrorError)` - No run found, or the query failed
pub fn generate_summary(
    store: &dyn ReportStore,
    run_id: Option<i64>,
) -> Result<MirrorSummary, MirrorError> {
    use crate::storage::EventKind;

    let run = match run_id {
        Some(id) => store.get_run(id)?,
        None => store
            .get_latest_run()?
            .ok_or_else(|| OutputError::Storage("No runs found in report database".to_string()))?,
    };

    let duration_seconds = match (
        run.started_at.parse::<chrono::DateTime<chrono::Utc>>(),
        run.finished_at
            .as_deref()
            .map(|f| f.parse::<chrono::DateTime<chrono::Utc>>()),
    ) {
        (Ok(started), Some(Ok(finished))) => Some((finished - started).num_seconds().max(0) as u64),
        _ => None,
    };

    Ok(MirrorSummary {
        run_id: run.id,
        completed: store.count_events(Some(run.id), EventKind::Completed)?,
        not_found: store.count_events(Some(run.id), EventKind::NotFound)?,
        errors: store.count_events(Some(run.id), EventKind::Error)?,
        top_not_found: store.get_not_found(run.id, SUMMARY_NOT_FOUND_LIMIT)?,
        recent_errors: store.get_errors(run.id, SUMMARY_ERROR_LIMIT)?,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
    })
}
