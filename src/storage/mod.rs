//! Checkpoint storage for jira2notion.
//!
//! This module provides the persistence layer for sync progress:
//! - [`CheckpointStore`] - the interface the sync engine writes through
//! - [`SqliteCheckpointStore`] - SQLite implementation with WAL mode and
//!   IMMEDIATE transactions for atomic read-modify-write
//!
//! # Submodules
//!
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - SQLite storage implementation

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteCheckpointStore;

use crate::error::Result;
use crate::model::{Checkpoint, RetryEntry};
use chrono::{DateTime, Utc};

/// Durable per-project sync progress.
///
/// `advance` is the only method that moves a checkpoint. It must be atomic
/// per project key and must never regress: advancing to a position at or
/// before the stored one is a no-op returning `Ok(false)`. A failed write
/// leaves the previous checkpoint intact.
///
/// The retry set is bookkeeping next to the checkpoint: it records issues
/// that failed so they are picked up again even after the checkpoint has
/// moved past their timestamp.
///
/// Sync leases make the store the single-flight authority. Every process
/// that shares the store sees the same leases, so a manual trigger is
/// rejected while a scheduled cycle holds the project.
pub trait CheckpointStore: Send + Sync {
    /// Read the checkpoint for a project.
    fn get(&self, project_key: &str) -> Result<Option<Checkpoint>>;

    /// Move the checkpoint forward to `(issue_key, timestamp)`.
    ///
    /// Returns `true` if the stored checkpoint changed.
    fn advance(&self, project_key: &str, issue_key: &str, timestamp: DateTime<Utc>) -> Result<bool>;

    /// Issues waiting to be retried for a project, oldest failure first.
    fn pending_retries(&self, project_key: &str) -> Result<Vec<RetryEntry>>;

    /// Record a failed issue in the retry set (incrementing its attempt count).
    fn defer(&self, project_key: &str, issue_key: &str, error: &str) -> Result<()>;

    /// Remove an issue from the retry set. Returns `true` if it was present.
    fn settle(&self, project_key: &str, issue_key: &str) -> Result<bool>;

    /// All stored checkpoints, ordered by project key.
    fn list(&self) -> Result<Vec<Checkpoint>>;

    /// Drop the checkpoint and retry set of a project.
    ///
    /// The next cycle starts from the configured lookback window.
    fn reset(&self, project_key: &str) -> Result<bool>;

    /// Take or renew the sync lease of a project until `expires_at`.
    ///
    /// Succeeds when no lease exists, the lease has expired, or `holder`
    /// already owns it. Returns `false` while another holder's lease is live.
    fn claim_lease(&self, project_key: &str, holder: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Drop the lease if `holder` still owns it. Returns `true` if removed.
    fn release_lease(&self, project_key: &str, holder: &str) -> Result<bool>;
}
