//! SQLite checkpoint store.
//!
//! This module provides the checkpoint backend using SQLite.
//! It follows the `mutate` pattern for transaction discipline: every write
//! runs in an IMMEDIATE transaction that is rolled back on any error.

use crate::error::{Error, Result};
use crate::model::{Checkpoint, RetryEntry};
use crate::storage::CheckpointStore;
use crate::storage::schema::apply_schema;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

/// SQLite-based checkpoint store.
///
/// The connection sits behind a mutex so the store can be shared across
/// tasks. No lock is ever held across an `.await`; every method is a short
/// synchronous transaction.
#[derive(Debug)]
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(timeout_ms.unwrap_or(5000)))?;
        apply_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Persistence("checkpoint connection lock poisoned".into()))
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// The write lock is taken up front so a concurrent writer (another
    /// process on the same file) cannot interleave between the read and the
    /// write. Commits on success, rolls back when `f` or the commit fails.
    fn mutate<F, R>(&self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        trace!(op, "checkpoint mutation committed");
        Ok(result)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn read_checkpoint(conn: &Connection, project_key: &str) -> rusqlite::Result<Option<Checkpoint>> {
    conn.query_row(
        "SELECT project_key, last_issue_id, last_seen_at, updated_at
         FROM checkpoints WHERE project_key = ?1",
        [project_key],
        map_checkpoint,
    )
    .optional()
}

fn map_checkpoint(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        project_key: row.get(0)?,
        last_issue_id: row.get(1)?,
        last_seen_timestamp: from_millis(row.get(2)?),
        updated_at: from_millis(row.get(3)?),
    })
}

impl CheckpointStore for SqliteCheckpointStore {
    fn get(&self, project_key: &str) -> Result<Option<Checkpoint>> {
        let conn = self.lock()?;
        Ok(read_checkpoint(&conn, project_key)?)
    }

    fn advance(&self, project_key: &str, issue_key: &str, timestamp: DateTime<Utc>) -> Result<bool> {
        let now = Utc::now().timestamp_millis();

        let advanced = self.mutate("advance", |tx| {
            if let Some(current) = read_checkpoint(tx, project_key)? {
                if !current.is_behind(issue_key, timestamp) {
                    return Ok(false);
                }
            }

            tx.execute(
                "INSERT INTO checkpoints (project_key, last_issue_id, last_seen_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_key) DO UPDATE SET
                    last_issue_id = excluded.last_issue_id,
                    last_seen_at = excluded.last_seen_at,
                    updated_at = excluded.updated_at",
                rusqlite::params![project_key, issue_key, timestamp.timestamp_millis(), now],
            )?;
            Ok(true)
        })?;

        if advanced {
            debug!(project = project_key, issue = issue_key, %timestamp, "Checkpoint advanced");
        }
        Ok(advanced)
    }

    fn pending_retries(&self, project_key: &str) -> Result<Vec<RetryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT project_key, issue_key, attempts, last_error, last_failed_at
             FROM retry_issues WHERE project_key = ?1
             ORDER BY last_failed_at ASC, issue_key ASC",
        )?;

        let entries = stmt
            .query_map([project_key], |row| {
                Ok(RetryEntry {
                    project_key: row.get(0)?,
                    issue_key: row.get(1)?,
                    attempts: row.get(2)?,
                    last_error: row.get(3)?,
                    last_failed_at: from_millis(row.get(4)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn defer(&self, project_key: &str, issue_key: &str, error: &str) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        self.mutate("defer", |tx| {
            tx.execute(
                "INSERT INTO retry_issues (project_key, issue_key, attempts, last_error, last_failed_at)
                 VALUES (?1, ?2, 1, ?3, ?4)
                 ON CONFLICT(project_key, issue_key) DO UPDATE SET
                    attempts = attempts + 1,
                    last_error = excluded.last_error,
                    last_failed_at = excluded.last_failed_at",
                rusqlite::params![project_key, issue_key, error, now],
            )?;
            Ok(())
        })
    }

    fn settle(&self, project_key: &str, issue_key: &str) -> Result<bool> {
        self.mutate("settle", |tx| {
            let removed = tx.execute(
                "DELETE FROM retry_issues WHERE project_key = ?1 AND issue_key = ?2",
                rusqlite::params![project_key, issue_key],
            )?;
            Ok(removed > 0)
        })
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT project_key, last_issue_id, last_seen_at, updated_at
             FROM checkpoints ORDER BY project_key",
        )?;
        let checkpoints = stmt
            .query_map([], map_checkpoint)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(checkpoints)
    }

    fn reset(&self, project_key: &str) -> Result<bool> {
        self.mutate("reset", |tx| {
            let removed = tx.execute(
                "DELETE FROM checkpoints WHERE project_key = ?1",
                [project_key],
            )?;
            tx.execute("DELETE FROM retry_issues WHERE project_key = ?1", [project_key])?;
            Ok(removed > 0)
        })
    }

    fn claim_lease(&self, project_key: &str, holder: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let now = Utc::now().timestamp_millis();

        let claimed = self.mutate("claim_lease", |tx| {
            let current: Option<(String, i64)> = tx
                .query_row(
                    "SELECT holder, expires_at FROM sync_leases WHERE project_key = ?1",
                    [project_key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((owner, until)) = current {
                if owner != holder && until > now {
                    return Ok(false);
                }
            }

            tx.execute(
                "INSERT INTO sync_leases (project_key, holder, acquired_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(project_key) DO UPDATE SET
                    holder = excluded.holder,
                    acquired_at = CASE WHEN sync_leases.holder = excluded.holder
                                       THEN sync_leases.acquired_at
                                       ELSE excluded.acquired_at END,
                    expires_at = excluded.expires_at",
                rusqlite::params![project_key, holder, now, expires_at.timestamp_millis()],
            )?;
            Ok(true)
        })?;

        trace!(project = project_key, holder, claimed, "Sync lease claim");
        Ok(claimed)
    }

    fn release_lease(&self, project_key: &str, holder: &str) -> Result<bool> {
        self.mutate("release_lease", |tx| {
            let removed = tx.execute(
                "DELETE FROM sync_leases WHERE project_key = ?1 AND holder = ?2",
                rusqlite::params![project_key, holder],
            )?;
            Ok(removed > 0)
        })
    }
}
