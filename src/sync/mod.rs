//! Jira → Notion synchronization.
//!
//! - [`FieldMapper`]: coerces Jira field values into typed Notion properties
//! - [`QueryBuilder`]: renders the JQL for each retrieval mode
//! - [`SyncEngine`]: runs new-issue, updated-issue and user passes for one project
//! - [`SyncOrchestrator`]: runs a cycle across all projects concurrently
//!
//! Progress is tracked per project in a [`CheckpointStore`](crate::storage::CheckpointStore).

mod engine;
mod flight;
mod mapper;
mod orchestrator;
mod query;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{DEFAULT_MAX_RETRY_ATTEMPTS, EngineOptions, SyncEngine};
pub use flight::{FlightPermit, ProjectLocks};
pub use mapper::{FieldMapper, MappedProperties, MappingWarning, adf_to_text, to_text};
pub use orchestrator::SyncOrchestrator;
pub use query::{CURRENT_USER, QueryBuilder};
pub use types::{CycleReport, IssueError, ProjectOutcome, SyncResult, TriggerKind};
