//! Checkpoint model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::issue::compare_issue_keys;

/// Durable marker of the last synchronized issue for one project.
///
/// Checkpoints only move forward: see [`Checkpoint::is_behind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub project_key: String,
    pub last_issue_id: String,
    pub last_seen_timestamp: DateTime<Utc>,
    /// When this checkpoint was last written (wall clock).
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Position of an issue relative to this checkpoint.
    ///
    /// Timestamps decide; equal timestamps fall back to issue key order.
    #[must_use]
    pub fn position_of(&self, issue_key: &str, timestamp: DateTime<Utc>) -> Ordering {
        timestamp
            .cmp(&self.last_seen_timestamp)
            .then_with(|| compare_issue_keys(issue_key, &self.last_issue_id))
    }

    /// Whether moving to `(issue_key, timestamp)` would advance this checkpoint.
    #[must_use]
    pub fn is_behind(&self, issue_key: &str, timestamp: DateTime<Utc>) -> bool {
        self.position_of(issue_key, timestamp) == Ordering::Greater
    }

    /// Whether an issue lies strictly after this checkpoint.
    ///
    /// An issue sharing the checkpoint's timestamp but with a different key
    /// counts as after: reprocessing is safe, skipping it is not.
    #[must_use]
    pub fn admits(&self, issue_key: &str, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.last_seen_timestamp
            || (timestamp == self.last_seen_timestamp && issue_key != self.last_issue_id)
    }
}

/// An issue that failed in an earlier batch and must be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryEntry {
    pub project_key: String,
    pub issue_key: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_failed_at: DateTime<Utc>,
}
