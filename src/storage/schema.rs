//! Database schema for the report ledger

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track mirror runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per completed, not-found or error report
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    referrer TEXT,
    resource_kind TEXT,
    status_code INTEGER,
    message TEXT,
    save_path TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_run_kind ON events(run_id, kind);
CREATE INDEX IF NOT EXISTS idx_events_url ON events(url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
