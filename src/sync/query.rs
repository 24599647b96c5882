//! JQL construction for each retrieval mode.
//!
//! JQL compares dates at minute resolution, so the lower bound is emitted
//! as `>=` at the minute floor of `since`. Callers must drop results at or
//! before the checkpoint themselves (see `Checkpoint::admits`).

use crate::model::ProjectConfig;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

/// Date format JQL accepts in comparisons.
const JQL_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Assignee value understood by Jira as the authenticated user.
pub const CURRENT_USER: &str = "currentUser()";

/// Builds project-scoped JQL.
///
/// Dates are rendered in `timezone`, which must match the timezone of the
/// Jira user the client authenticates as; Jira interprets JQL dates in it.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    timezone: Tz,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}

impl QueryBuilder {
    #[must_use]
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Issues created after `since`, oldest first. `None` means no bound.
    #[must_use]
    pub fn build_new_issues_query(
        &self,
        project: &ProjectConfig,
        since: Option<DateTime<Utc>>,
    ) -> String {
        let mut clauses = self.scope(project);
        if let Some(since) = since {
            clauses.push(format!("created >= \"{}\"", self.format_date(since)));
        }
        finish(&clauses, "created")
    }

    /// Issues updated after `since`, least recently updated first.
    #[must_use]
    pub fn build_updated_issues_query(
        &self,
        project: &ProjectConfig,
        since: Option<DateTime<Utc>>,
    ) -> String {
        let mut clauses = self.scope(project);
        if let Some(since) = since {
            clauses.push(format!("updated >= \"{}\"", self.format_date(since)));
        }
        finish(&clauses, "updated")
    }

    /// Every issue of the project assigned to `assignee`, no time bound.
    ///
    /// `currentUser()` is passed through as a function call; anything else
    /// (account id or email) is quoted.
    #[must_use]
    pub fn build_user_issues_query(&self, project: &ProjectConfig, assignee: &str) -> String {
        let mut clauses = self.scope(project);
        let assignee = assignee.trim();
        if assignee.eq_ignore_ascii_case(CURRENT_USER) {
            clauses.push(format!("assignee = {CURRENT_USER}"));
        } else {
            clauses.push(format!("assignee = {}", quote(assignee)));
        }
        finish(&clauses, "created")
    }

    /// The given issues of the project, oldest first.
    ///
    /// Returns `None` for an empty key list.
    #[must_use]
    pub fn build_retry_query(&self, project: &ProjectConfig, keys: &[String]) -> Option<String> {
        if keys.is_empty() {
            return None;
        }
        let mut clauses = self.scope(project);
        let quoted: Vec<String> = keys.iter().map(|k| quote(k)).collect();
        clauses.push(format!("key in ({})", quoted.join(", ")));
        Some(finish(&clauses, "created"))
    }

    /// Render a timestamp as a JQL date literal, floored to the minute.
    #[must_use]
    pub fn format_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.timezone)
            .format(JQL_DATE_FORMAT)
            .to_string()
    }

    fn scope(&self, project: &ProjectConfig) -> Vec<String> {
        let mut clauses = vec![format!("project = {}", quote(&project.key))];
        let filter = project.jql_filter.trim();
        if !filter.is_empty() {
            clauses.push(format!("({filter})"));
        }
        clauses
    }
}

fn finish(clauses: &[String], order_field: &str) -> String {
    format!(
        "{} ORDER BY {order_field} ASC, key ASC",
        clauses.join(" AND ")
    )
}

/// Quote a JQL string literal.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
