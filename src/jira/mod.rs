//! Jira capability.
//!
//! The sync engine only talks to Jira through [`JiraApi`]. The HTTP
//! implementation lives in [`client`]; tests substitute an in-memory fake.

pub mod client;

pub use client::HttpJiraClient;

use crate::error::Result;
use crate::model::{ChangelogEntry, IssueRecord};
use std::future::Future;

/// Read access to Jira issues.
///
/// Implementations must return every page of results; the engine never
/// paginates itself.
pub trait JiraApi: Send + Sync {
    /// Run a JQL search, returning issues in the order Jira sorted them.
    ///
    /// `fields` are the Jira field ids to include in each record.
    fn search_issues(
        &self,
        jql: &str,
        fields: &[String],
    ) -> impl Future<Output = Result<Vec<IssueRecord>>> + Send;

    /// Full change history of one issue, oldest entry first.
    fn get_changelog(
        &self,
        issue_key: &str,
    ) -> impl Future<Output = Result<Vec<ChangelogEntry>>> + Send;

    /// Verify that the site is reachable and the credentials are accepted.
    fn check_connection(&self) -> impl Future<Output = Result<()>> + Send;
}
