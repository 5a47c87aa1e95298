//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the ReportStore trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{ReportStore, StorageError, StorageResult};
use crate::storage::{EventKind, EventRecord, NotFoundSummary, RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite report backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Running),
    })
}

impl ReportStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Events =====

    fn record_event(&mut self, run_id: i64, event: &EventRecord) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO events (run_id, kind, url, referrer, resource_kind, status_code, message, save_path, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                event.kind.to_db_string(),
                event.url,
                event.referrer,
                event.resource_kind,
                event.status_code,
                event.message,
                event.save_path,
                event.recorded_at,
            ],
        )?;
        Ok(())
    }

    fn count_events(&self, run_id: Option<i64>, kind: EventKind) -> StorageResult<u64> {
        let count: i64 = match run_id {
            Some(run_id) => self.conn.query_row(
                "SELECT COUNT(*) FROM events WHERE run_id = ?1 AND kind = ?2",
                params![run_id, kind.to_db_string()],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM events WHERE kind = ?1",
                params![kind.to_db_string()],
                |row| row.get(0),
            )?,
        };
        Ok(count as u64)
    }

    fn get_not_found(&self, run_id: i64, limit: usize) -> StorageResult<Vec<NotFoundSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, COUNT(*) AS hits FROM events
             WHERE run_id = ?1 AND kind = ?2
             GROUP BY url ORDER BY hits DESC, url ASC LIMIT ?3",
        )?;

        let rows = stmt.query_map(
            params![run_id, EventKind::NotFound.to_db_string(), limit as i64],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut referrer_stmt = self.conn.prepare(
            "SELECT DISTINCT referrer FROM events
             WHERE run_id = ?1 AND kind = ?2 AND url = ?3 AND referrer IS NOT NULL
             ORDER BY referrer",
        )?;

        let mut summaries = Vec::new();
        for row in rows {
            let (url, hits) = row?;
            let referrers = referrer_stmt
                .query_map(
                    params![run_id, EventKind::NotFound.to_db_string(), url],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            summaries.push(NotFoundSummary {
                url,
                count: hits as u64,
                referrers,
            });
        }

        Ok(summaries)
    }

    fn get_errors(&self, run_id: i64, limit: usize) -> StorageResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, url, referrer, resource_kind, status_code, message, save_path, recorded_at
             FROM events WHERE run_id = ?1 AND kind = ?2 ORDER BY id ASC LIMIT ?3",
        )?;

        let events = stmt
            .query_map(
                params![run_id, EventKind::Error.to_db_string(), limit as i64],
                |row| {
                    Ok(EventRecord {
                        kind: EventKind::from_db_string(&row.get::<_, String>(0)?)
                            .unwrap_or(EventKind::Error),
                        url: row.get(1)?,
                        referrer: row.get(2)?,
                        resource_kind: row.get(3)?,
                        status_code: row.get(4)?,
                        message: row.get(5)?,
                        save_path: row.get(6)?,
                        recorded_at: row.get(7)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}
