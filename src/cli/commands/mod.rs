//! Command implementations.

pub mod checkpoint;
pub mod completions;
pub mod run;
pub mod status;
pub mod sync;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use crate::config::{Settings, load_settings, resolve_db_path};
use crate::error::{Error, Result};
use crate::jira::HttpJiraClient;
use crate::model::ProjectConfig;
use crate::notion::HttpNotionClient;
use crate::storage::SqliteCheckpointStore;
use crate::sync::{EngineOptions, QueryBuilder, SyncEngine, SyncOrchestrator};
use crate::validate::find_similar_keys;

/// Engine wired to the real services.
pub type HttpEngine = SyncEngine<HttpJiraClient, HttpNotionClient, SqliteCheckpointStore>;

/// Orchestrator wired to the real services.
pub type HttpOrchestrator = SyncOrchestrator<HttpJiraClient, HttpNotionClient, SqliteCheckpointStore>;

/// Load settings and refuse to continue without any project.
pub(crate) fn load_with_projects(config: Option<&Path>) -> Result<Settings> {
    let settings = load_settings(config)?;
    if settings.projects.is_empty() {
        return Err(Error::Config(
            "No projects configured. Add `projects` to config.json or set JIRA_PROJECT_KEY."
                .to_string(),
        ));
    }
    Ok(settings)
}

/// Open (creating if needed) the checkpoint database.
pub(crate) fn open_store(db: Option<&Path>) -> Result<SqliteCheckpointStore> {
    let path = resolve_db_path(db).ok_or_else(|| {
        Error::Config("Could not determine home directory; pass --db".to_string())
    })?;
    SqliteCheckpointStore::open(&path)
}

pub(crate) fn build_engine(settings: &Settings, db: Option<&Path>) -> Result<HttpEngine> {
    let jira = HttpJiraClient::new(&settings.jira)?;
    let notion = HttpNotionClient::new(&settings.notion)?;
    let store = open_store(db)?;

    Ok(SyncEngine::new(
        Arc::new(jira),
        Arc::new(notion),
        Arc::new(store),
        settings.field_mapping(),
        EngineOptions::from_settings(settings),
    )
    .with_query_builder(QueryBuilder::new(settings.timezone()?)))
}

/// Resolve `--project` arguments against the config. Empty means all.
pub(crate) fn select_projects(settings: &Settings, keys: &[String]) -> Result<Vec<ProjectConfig>> {
    if keys.is_empty() {
        return Ok(settings.projects.clone());
    }

    let known = settings.project_keys();
    keys.iter()
        .map(|key| {
            settings.project(key).cloned().ok_or_else(|| {
                let similar = find_similar_keys(&key.to_uppercase(), &known, 3);
                if similar.is_empty() {
                    Error::ProjectNotFound { key: key.clone() }
                } else {
                    Error::InvalidArgument(format!(
                        "Unknown project '{key}'. Did you mean: {}?",
                        similar.join(", ")
                    ))
                }
            })
        })
        .collect()
}

/// Multi-threaded runtime for the async commands.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))
}
