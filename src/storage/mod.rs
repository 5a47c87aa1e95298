//! Storage module for mirrored artifacts and the report ledger
//!
//! This module handles:
//! - The on-disk layout of the mirror (`save_path`, `relative_link`)
//! - Writing fetched artifacts (`FsStore`)
//! - SQLite persistence of run and report records (`SqliteStorage`)

mod fs;
mod layout;
mod schema;
mod sqlite;
mod traits;

pub use fs::FsStore;
pub use layout::{relative_link, save_path};
pub use sqlite::SqliteStorage;
pub use traits::{Persister, ReportStore, StorageError, StorageResult};

use std::path::Path;

/// Opens (creating if needed) the report database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Represents a mirror run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a mirror run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// The three report streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Completed,
    NotFound,
    Error,
}

impl EventKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NotFound => "not_found",
            Self::Error => "error",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "not_found" => Some(Self::NotFound),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One stored report record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub kind: EventKind,
    pub url: String,
    pub referrer: Option<String>,
    pub resource_kind: Option<String>,
    pub status_code: Option<u16>,
    pub message: Option<String>,
    pub save_path: Option<String>,
    pub recorded_at: String,
}

/// A not-found URL with the documents that linked to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFoundSummary {
    pub url: String,
    pub count: u64,
    pub referrers: Vec<String>,
}
