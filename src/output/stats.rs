//! Statistics from the report database
//!
//! This module provides functionality for reading per-stream counts
//! back from the report ledger and displaying them.

use crate::storage::{EventKind, ReportStore, RunRecord};
use crate::MirrorError;

/// Report stream counts for one run, or across all runs
#[derive(Debug, Clone)]
pub struct MirrorStatistics {
    /// The run the counts belong to; `None` when no run was recorded yet
    pub run: Option<RunRecord>,

    /// Resources saved during the run
    pub completed: u64,

    /// 404 responses during the run
    pub not_found: u64,

    /// Other failures during the run
    pub errors: u64,

    /// Saved resources across every recorded run
    pub completed_all_runs: u64,
}

impl MirrorStatistics {
    pub fn total(&self) -> u64 {
        self.completed + self.not_found + self.errors
    }
}

/// Loads statistics for the latest run
///
/// # Arguments
///
/// * `store` - The report backend to query
///
/// # Returns
///
/// * `Ok(MirrorStatistics)` - Successfully loaded statistics
/// * `Err(MirrorError)` - Failed to query statistics
pub fn load_statistics(store: &dyn ReportStore) -> Result<MirrorStatistics, MirrorError> {
    let run = store.get_latest_run()?;
    let run_id = run.as_ref().map(|r| r.id);

    let (completed, not_found, errors) = match run_id {
        Some(id) => (
            store.count_events(Some(id), EventKind::Completed)?,
            store.count_events(Some(id), EventKind::NotFound)?,
            store.count_events(Some(id), EventKind::Error)?,
        ),
        None => (0, 0, 0),
    };

    Ok(MirrorStatistics {
        run,
        completed,
        not_found,
        errors,
        completed_all_runs: store.count_events(None, EventKind::Completed)?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &MirrorStatistics) {
    println!("=== Mirror Statistics ===\n");

    match &stats.run {
        Some(run) => {
            println!("Latest Run:");
            println!("  ID: {}", run.id);
            println!("  Started: {}", run.started_at);
            if let Some(finished) = &run.finished_at {
                println!("  Finished: {}", finished);
            }
            println!("  Status: {}", run.status.to_db_string());
            println!();
        }
        None => {
            println!("No runs recorded yet.");
            return;
        }
    }

    println!("Report Streams:");
    for (label, count) in [
        ("Completed", stats.completed),
        ("Not found", stats.not_found),
        ("Errors", stats.errors),
    ] {
        let percentage = if stats.total() > 0 {
            (count as f64 / stats.total() as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", label, count, percentage);
    }
    println!();

    println!(
        "Saved across all runs: {}",
        stats.completed_all_runs
    );
}
