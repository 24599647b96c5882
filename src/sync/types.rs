//! Result types returned by the sync engine and orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind};

/// What started a sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The periodic interval timer.
    Scheduled,
    /// An operator asked for it (CLI `sync`).
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A per-issue problem recorded in a [`SyncResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueError {
    pub issue_key: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl IssueError {
    #[must_use]
    pub fn new(issue_key: impl Into<String>, error: &Error) -> Self {
        Self {
            issue_key: issue_key.into(),
            error_kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one engine entry point for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub processed_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub skipped_count: usize,
    /// Issues that failed, in processing order.
    pub errors: Vec<IssueError>,
    /// Non-fatal problems (properties dropped during mapping).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<IssueError>,
}

impl SyncResult {
    pub fn record_created(&mut self) {
        self.processed_count += 1;
        self.created_count += 1;
    }

    pub fn record_updated(&mut self) {
        self.processed_count += 1;
        self.updated_count += 1;
    }

    pub fn record_skipped(&mut self) {
        self.processed_count += 1;
        self.skipped_count += 1;
    }

    pub fn record_failed(&mut self, issue_key: &str, error: &Error) {
        self.processed_count += 1;
        self.errors.push(IssueError::new(issue_key, error));
    }

    pub fn record_warning(&mut self, issue_key: &str, error: &Error) {
        self.warnings.push(IssueError::new(issue_key, error));
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: Self) {
        self.processed_count += other.processed_count;
        self.created_count += other.created_count;
        self.updated_count += other.updated_count;
        self.skipped_count += other.skipped_count;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// What happened to one project during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectOutcome {
    Synced(SyncResult),
    /// The project could not be synced at all this cycle.
    Failed { kind: ErrorKind, message: String },
    /// Another sync of this project was already running; trigger rejected.
    Busy,
}

impl ProjectOutcome {
    /// Classify an engine result.
    #[must_use]
    pub fn from_result(result: crate::error::Result<SyncResult>) -> Self {
        match result {
            Ok(result) => Self::Synced(result),
            Err(Error::SyncInProgress { .. }) => Self::Busy,
            Err(e) => Self::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            Self::Synced(result) => Some(result),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Aggregate of one orchestrator cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub projects: BTreeMap<String, ProjectOutcome>,
}

impl CycleReport {
    /// Projects that failed outright.
    #[must_use]
    pub fn failed_projects(&self) -> Vec<&str> {
        self.projects
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(key, _)| key.as_str())
            .collect()
    }

    #[must_use]
    pub fn issue_error_count(&self) -> usize {
        self.projects
            .values()
            .filter_map(ProjectOutcome::result)
            .map(|r| r.errors.len())
            .sum()
    }

    /// Partial success: at least one project or issue failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failed_projects().is_empty() || self.issue_error_count() > 0
    }

    /// Counts summed over every synced project.
    #[must_use]
    pub fn totals(&self) -> SyncResult {
        let mut total = SyncResult::default();
        for result in self.projects.values().filter_map(ProjectOutcome::result) {
            total.merge(result.clone());
        }
        total
    }

    /// The report as an error, if anything failed.
    ///
    /// A manual trigger that found a project already syncing was rejected
    /// for that project and reports `SyncInProgress`. Scheduled cycles
    /// simply skip busy projects.
    #[must_use]
    pub fn failure(&self) -> Option<Error> {
        if self.has_failures() {
            return Some(Error::PartialFailure {
                failed_projects: self.failed_projects().len(),
                issue_errors: self.issue_error_count(),
            });
        }
        if self.trigger != TriggerKind::Manual {
            return None;
        }
        self.projects
            .iter()
            .find(|(_, outcome)| **outcome == ProjectOutcome::Busy)
            .map(|(key, _)| Error::SyncInProgress {
                project: key.clone(),
            })
    }

    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
