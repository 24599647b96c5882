//! Database schema definitions.
//!
//! The checkpoint database is small: one row per project, the set of issues
//! waiting to be retried, and the lease of any sync currently running.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: &str = "002_sync_leases";

/// The complete SQL schema for the checkpoint database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- One high-water mark per project. Only ever moves forward.
CREATE TABLE IF NOT EXISTS checkpoints (
    project_key TEXT PRIMARY KEY,
    last_issue_id TEXT NOT NULL,
    last_seen_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Issues that failed and must be picked up again regardless of the checkpoint.
CREATE TABLE IF NOT EXISTS retry_issues (
    project_key TEXT NOT NULL,
    issue_key TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 1,
    last_error TEXT,
    last_failed_at INTEGER NOT NULL,
    PRIMARY KEY (project_key, issue_key)
);

CREATE INDEX IF NOT EXISTS idx_retry_issues_project ON retry_issues(project_key);

-- At most one running sync per project, across every process sharing the file.
-- A lease past expires_at belongs to a crashed holder and may be taken over.
CREATE TABLE IF NOT EXISTS sync_leases (
    project_key TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
";

/// Apply the schema and record its version.
///
/// Idempotent; safe to call on every open.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![CURRENT_SCHEMA_VERSION, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("first apply");
        apply_schema(&conn).expect("second apply");

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
