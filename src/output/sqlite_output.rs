//! SQLite-based reporter implementation
//!
//! This module provides a reporter that records each report stream event
//! directly to the report database, one row per event.

use crate::crawler::CrawlOutcome;
use crate::output::traits::{
    CompletedRecord, ErrorRecord, NotFoundRecord, OutputError, OutputResult, Reporter,
};
use crate::storage::{EventKind, EventRecord, ReportStore, RunStatus};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};

/// SQLite-based reporter
///
/// Records are appended to the `events` table of the current run; `finish`
/// marks the run completed.
pub struct SqliteReporter {
    store: Arc<Mutex<dyn ReportStore>>,
    run_id: i64,
}

impl SqliteReporter {
    /// Creates a new SQLite reporter
    ///
    /// # Arguments
    ///
    /// * `store` - The report backend to use
    /// * `run_id` - The current run ID
    pub fn new(store: Arc<Mutex<dyn ReportStore>>, run_id: i64) -> Self {
        Self { store, run_id }
    }

    /// Opens a new run in `store` and returns a reporter for it
    pub fn start_run(store: Arc<Mutex<dyn ReportStore>>, config_hash: &str) -> OutputResult<Self> {
        let run_id = {
            let mut guard = lock(&store)?;
            guard
                .create_run(config_hash)
                .map_err(|e| OutputError::Storage(e.to_string()))?
        };
        Ok(Self::new(store, run_id))
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Marks the run with a final status other than completed
    pub fn abandon(&self, status: RunStatus) -> OutputResult<()> {
        lock(&self.store)?
            .finish_run(self.run_id, status)
            .map_err(|e| OutputError::Storage(e.to_string()))
    }

    fn record(&self, event: EventRecord) -> OutputResult<()> {
        lock(&self.store)?
            .record_event(self.run_id, &event)
            .map_err(|e| OutputError::Storage(e.to_string()))
    }
}

fn lock<'a>(
    store: &'a Mutex<dyn ReportStore + 'static>,
) -> OutputResult<MutexGuard<'a, dyn ReportStore + 'static>> {
    store
        .lock()
        .map_err(|e| OutputError::Storage(format!("Failed to lock report store: {}", e)))
}

impl Reporter for SqliteReporter {
    fn completed(&self, record: &CompletedRecord) -> OutputResult<()> {
        self.record(EventRecord {
            kind: EventKind::Completed,
            url: record.url.clone(),
            referrer: record.referrer.clone(),
            resource_kind: Some(record.kind.as_str().to_string()),
            status_code: None,
            message: None,
            save_path: Some(record.save_path.display().to_string()),
            recorded_at: Utc::now().to_rfc3339(),
        })
    }

    fn not_found(&self, record: &NotFoundRecord) -> OutputResult<()> {
        self.record(EventRecord {
            kind: EventKind::NotFound,
            url: record.url.clone(),
            referrer: record.referrer.clone(),
            resource_kind: None,
            status_code: Some(404),
            message: None,
            save_path: None,
            recorded_at: Utc::now().to_rfc3339(),
        })
    }

    fn error(&self, record: &ErrorRecord) -> OutputResult<()> {
        self.record(EventRecord {
            kind: EventKind::Error,
            url: record.url.clone(),
            referrer: record.referrer.clone(),
            resource_kind: Some(record.kind.as_str().to_string()),
            status_code: record.status_code,
            message: Some(record.message.clone()),
            save_path: None,
            recorded_at: Utc::now().to_rfc3339(),
        })
    }

    fn finish(&self, outcome: &CrawlOutcome) -> OutputResult<()> {
        let status = if outcome.finished {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };
        lock(&self.store)?
            .finish_run(self.run_id, status)
            .map_err(|e| OutputError::Storage(e.to_string()))
    }
}
