//! Project model for jira2notion.
//!
//! A project is one Jira project key plus the JQL restriction and the
//! Notion database its issues are mirrored into.

use serde::{Deserialize, Serialize};

/// A configured Jira project.
///
/// Projects are loaded once from config and never mutated. The `key` is
/// unique across the configured set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Jira project key (e.g. "PROJ")
    pub key: String,

    /// Extra JQL ANDed onto every query for this project.
    ///
    /// Empty means no restriction beyond `project = KEY`.
    #[serde(default, alias = "jql")]
    pub jql_filter: String,

    /// Target Notion database. Falls back to the global default when absent.
    #[serde(default, alias = "database_id")]
    pub notion_database_id: Option<String>,

    /// Default assignee for on-demand user syncs.
    #[serde(default)]
    pub assignee: Option<String>,
}

impl ProjectConfig {
    /// Create a project with no extra filter and the default database.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            jql_filter: String::new(),
            notion_database_id: None,
            assignee: None,
        }
    }

    /// Set the JQL filter.
    #[must_use]
    pub fn with_filter(mut self, jql: impl Into<String>) -> Self {
        self.jql_filter = jql.into();
        self
    }

    /// Set the target database.
    #[must_use]
    pub fn with_database(mut self, database_id: impl Into<String>) -> Self {
        self.notion_database_id = Some(database_id.into());
        self
    }

    /// Resolve the Notion database for this project.
    ///
    /// Returns `None` when neither the project nor the global config names one.
    #[must_use]
    pub fn database_id<'a>(&'a self, default: Option<&'a str>) -> Option<&'a str> {
        self.notion_database_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .or(default.filter(|id| !id.trim().is_empty()))
    }
}
