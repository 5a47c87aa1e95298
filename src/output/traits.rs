//! Reporter trait and report record types
//!
//! The engine emits one record per event on three append-only streams:
//! completed, not-found and error. Reporters decide where they go.

use crate::crawler::CrawlOutcome;
use crate::state::{Resource, ResourceKind};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// A resource that was fetched, processed and saved
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRecord {
    pub url: String,
    pub referrer: Option<String>,
    pub kind: ResourceKind,
    pub depth: u32,
    pub save_path: PathBuf,
    /// Time spent queued before the fetch started
    pub wait_time: Option<Duration>,
    pub download_time: Option<Duration>,
}

impl CompletedRecord {
    pub fn from_resource(resource: &Resource) -> Self {
        Self {
            url: resource.key.to_string(),
            referrer: resource.referrer.as_ref().map(|r| r.to_string()),
            kind: resource.kind,
            depth: resource.depth,
            save_path: resource.save_path.clone(),
            wait_time: resource.wait_time,
            download_time: resource.download_time,
        }
    }
}

/// A resource whose fetch answered HTTP 404
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFoundRecord {
    pub url: String,
    pub referrer: Option<String>,
}

/// Any other per-resource failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub url: String,
    pub referrer: Option<String>,
    pub kind: ResourceKind,
    pub status_code: Option<u16>,
    pub message: String,
}

/// Sink for the three report streams
///
/// Implementations must be thread-safe; the engine reports from every task.
pub trait Reporter: Send + Sync {
    /// Records a resource that was saved
    fn completed(&self, record: &CompletedRecord) -> OutputResult<()>;

    /// Records a 404
    fn not_found(&self, record: &NotFoundRecord) -> OutputResult<()>;

    /// Records any other failure
    fn error(&self, record: &ErrorRecord) -> OutputResult<()>;

    /// Called once when a run reaches idle
    fn finish(&self, outcome: &CrawlOutcome) -> OutputResult<()> {
        let _ = outcome;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_completed_record_from_resource() {
        let key = Url::parse("https://example.com/a/").unwrap();
        let mut resource = Resource::new(
            "/a/",
            key,
            ResourceKind::Html,
            2,
            Some(Url::parse("https://example.com/").unwrap()),
            PathBuf::from("/m/example.com/a/index.html"),
        );
        resource.download_time = Some(Duration::from_millis(15));

        let record = CompletedRecord::from_resource(&resource);
        assert_eq!(record.url, "https://example.com/a/");
        assert_eq!(record.referrer.as_deref(), Some("https://example.com/"));
        assert_eq!(record.depth, 2);
        assert_eq!(record.download_time, Some(Duration::from_millis(15)));
        assert!(record.wait_time.is_none());
    }
}
