//! Storage traits and error types
//!
//! Two collaborators live here: the [`Persister`] that writes mirrored
//! artifacts, and the [`ReportStore`] that keeps the append-only report ledger.

use crate::state::Resource;
use crate::storage::{EventKind, EventRecord, NotFoundSummary, RunRecord, RunStatus};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Nothing to save for {0}")]
    MissingContent(String),

    #[error("Invalid save path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Writes fetched artifacts to the mirror
///
/// Saving is idempotent: saving the same key again overwrites the file.
#[async_trait]
pub trait Persister: Send + Sync {
    /// Local destination of a canonical key; a pure function of the key
    fn save_path(&self, key: &Url) -> PathBuf;

    /// Writes the resource's payload to its save path, and its redirect
    /// copy to the redirect target's save path when it owns one
    async fn save(&self, resource: &Resource) -> StorageResult<()>;
}

/// Backend for the report ledger
///
/// Implementations are used behind a mutex by the reporters.
pub trait ReportStore: Send {
    // ===== Run Management =====

    /// Creates a new run and returns its ID
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with the given status
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Events =====

    /// Appends one report record to a run
    fn record_event(&mut self, run_id: i64, event: &EventRecord) -> StorageResult<()>;

    /// Counts events of a kind; `None` counts across all runs
    fn count_events(&self, run_id: Option<i64>, kind: EventKind) -> StorageResult<u64>;

    /// Not-found URLs of a run, most referenced first, with their referrers
    fn get_not_found(&self, run_id: i64, limit: usize) -> StorageResult<Vec<NotFoundSummary>>;

    /// Error events of a run in recording order
    fn get_errors(&self, run_id: i64, limit: usize) -> StorageResult<Vec<EventRecord>>;
}
