//! Error types for jira2notion.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=persistence, 3=not_found, 4=validation, etc.)
//! - Sync error kinds (`ErrorKind`) recorded per issue in a `SyncResult`
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for jira2notion operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Kind ────────────────────────────────────────────────

/// How the sync engine treats an error.
///
/// Every [`Error`] maps onto exactly one kind. The kind decides whether
/// a failure stays local to one issue, falls back to another operation,
/// or fails the whole project for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure, rate limit or server error. Retried next cycle.
    TransientApi,
    /// A mapped value could not be expressed in the target schema.
    SchemaMismatch,
    /// An expected Notion page (or Jira issue) does not exist.
    NotFound,
    /// Missing or invalid configuration. Fatal for the affected project only.
    Config,
    /// The checkpoint store could not be read or written.
    Persistence,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransientApi => "transient_api",
            Self::SchemaMismatch => "schema_mismatch",
            Self::NotFound => "not_found",
            Self::Config => "config",
            Self::Persistence => "persistence",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The remote service an API error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Jira,
    Notion,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jira => f.write_str("Jira"),
            Self::Notion => f.write_str("Notion"),
        }
    }
}

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Persistence (exit 2)
    DatabaseError,
    PersistenceError,

    // Not Found (exit 3)
    ProjectNotFound,
    ApiNotFound,

    // Validation (exit 4)
    InvalidArgument,
    SchemaMismatch,

    // Concurrency (exit 5)
    SyncInProgress,

    // Sync (exit 6)
    PartialFailure,
    TransientApi,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::PersistenceError => "PERSISTENCE_ERROR",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::SchemaMismatch => "SCHEMA_MISMATCH",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::PartialFailure => "PARTIAL_FAILURE",
            Self::TransientApi => "TRANSIENT_API_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError | Self::PersistenceError => 2,
            Self::ProjectNotFound | Self::ApiNotFound => 3,
            Self::InvalidArgument | Self::SchemaMismatch => 4,
            Self::SyncInProgress => 5,
            Self::PartialFailure | Self::TransientApi => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether running the same command again later can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientApi
                | Self::SyncInProgress
                | Self::PartialFailure
                | Self::DatabaseError
                | Self::PersistenceError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in jira2notion operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{service} API error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        service: Service,
        status: Option<u16>,
        message: String,
    },

    #[error("Project not configured: {key}")]
    ProjectNotFound { key: String },

    #[error("Property '{property}' cannot hold value: {reason}")]
    SchemaMismatch { property: String, reason: String },

    #[error("Sync already in progress for project {project}")]
    SyncInProgress { project: String },

    #[error("Sync finished with {failed_projects} failed project(s) and {issue_errors} issue error(s)")]
    PartialFailure {
        failed_projects: usize,
        issue_errors: usize,
    },

    #[error("Checkpoint persistence failed: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an API error from an HTTP status and response body.
    #[must_use]
    pub fn api(service: Service, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Build an API error for a failure that never produced a response.
    #[must_use]
    pub fn transport(service: Service, err: &reqwest::Error) -> Self {
        Self::Api {
            service,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Classify this error for the sync engine.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { status, .. } => match status {
                Some(404) => ErrorKind::NotFound,
                Some(400 | 401 | 403) => ErrorKind::Config,
                _ => ErrorKind::TransientApi,
            },
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::ProjectNotFound { .. } | Self::Config(_) | Self::InvalidArgument(_) => {
                ErrorKind::Config
            }
            Self::Persistence(_) | Self::Database(_) => ErrorKind::Persistence,
            Self::SyncInProgress { .. }
            | Self::PartialFailure { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ErrorKind::TransientApi,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Api { status, .. } => match status {
                Some(404) => ErrorCode::ApiNotFound,
                Some(400 | 401 | 403) => ErrorCode::ConfigError,
                _ => ErrorCode::TransientApi,
            },
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
            Self::SyncInProgress { .. } => ErrorCode::SyncInProgress,
            Self::PartialFailure { .. } => ErrorCode::PartialFailure,
            Self::Persistence(_) => ErrorCode::PersistenceError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Api {
                service,
                status: Some(401 | 403),
                ..
            } => Some(match service {
                Service::Jira => {
                    "Check JIRA_EMAIL and JIRA_API_TOKEN. The token must belong to the email."
                        .to_string()
                }
                Service::Notion => "Check NOTION_API_KEY and share the database with the \
                                    integration (••• → Connections)."
                    .to_string(),
            }),
            Self::Api {
                service: Service::Jira,
                status: Some(400),
                ..
            } => Some("Jira rejected the query. Check the project's jql_filter.".to_string()),

            Self::ProjectNotFound { key } => Some(format!(
                "No project '{key}' in the config. Use `j2n checkpoint list` or check `projects` in config.json."
            )),

            Self::SyncInProgress { project } => Some(format!(
                "Another sync for {project} is running. Try again when it finishes."
            )),

            Self::PartialFailure { .. } => Some(
                "Failed issues are retried on the next cycle. Run with -v for details.".to_string(),
            ),

            Self::Persistence(_) | Self::Database(_) => Some(
                "The checkpoint database could not be written. Check `--db` / J2N_DB permissions."
                    .to_string(),
            ),

            Self::Config(msg) if msg.contains("database") => Some(
                "Set notion.default_database_id, NOTION_DATABASE_ID, or notion_database_id on the project."
                    .to_string(),
            ),

            Self::Api { .. }
            | Self::SchemaMismatch { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, kind, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "kind": self.kind().as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
