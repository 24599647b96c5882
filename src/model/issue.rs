//! Jira issue records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A Jira issue as fetched for one sync pass.
///
/// `fields` holds the raw JSON value of every requested field, keyed by
/// Jira field id (`summary`, `status`, `customfield_10010`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub issue_key: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    /// Filled lazily by the engine for updated-issue detection.
    #[serde(default)]
    pub changelog: Vec<ChangelogEntry>,
    pub assignee: Option<Assignee>,
}

impl IssueRecord {
    /// Create a record with no fields.
    pub fn new(issue_key: impl Into<String>, created: DateTime<Utc>, updated: DateTime<Utc>) -> Self {
        Self {
            issue_key: issue_key.into(),
            fields: BTreeMap::new(),
            created,
            updated,
            changelog: Vec::new(),
            assignee: None,
        }
    }

    /// Add a raw field value.
    #[must_use]
    pub fn with_field(mut self, field_id: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(field_id.into(), value);
        self
    }

    /// Set the assignee.
    #[must_use]
    pub fn with_assignee(mut self, assignee: Assignee) -> Self {
        self.assignee = Some(assignee);
        self
    }

    /// Summary text, if present.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.fields.get("summary").and_then(serde_json::Value::as_str)
    }
}

/// The Jira user an issue is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub account_id: Option<String>,
    pub display_name: Option<String>,
    pub email_address: Option<String>,
}

/// One history entry from an issue's changelog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub created: DateTime<Utc>,
    pub items: Vec<ChangeItem>,
}

/// A single field change inside a changelog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    /// Display name of the field (e.g. "status", "Story Points").
    pub field: String,
    /// Stable field id (e.g. "status", "customfield_10016"). Absent for some legacy fields.
    pub field_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl ChangeItem {
    /// Whether this change touched the given Jira field id.
    ///
    /// Matches on `field_id` when Jira provides it, otherwise falls back to
    /// a case-insensitive match on the display name.
    #[must_use]
    pub fn touches(&self, jira_field_id: &str) -> bool {
        match &self.field_id {
            Some(id) => id == jira_field_id,
            None => self.field.eq_ignore_ascii_case(jira_field_id),
        }
    }
}

/// Order issue keys by project prefix, then by numeric suffix.
///
/// `PROJ-9` sorts before `PROJ-10`. Keys without a numeric suffix fall
/// back to plain string order.
#[must_use]
pub fn compare_issue_keys(a: &str, b: &str) -> Ordering {
    match (split_key(a), split_key(b)) {
        (Some((pa, na)), Some((pb, nb))) => pa.cmp(pb).then(na.cmp(&nb)),
        _ => a.cmp(b),
    }
}

fn split_key(key: &str) -> Option<(&str, u64)> {
    let (prefix, number) = key.rsplit_once('-')?;
    number.parse().ok().map(|n| (prefix, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_issue_keys_numeric() {
        assert_eq!(compare_issue_keys("PROJ-9", "PROJ-10"), Ordering::Less);
        assert_eq!(compare_issue_keys("PROJ-10", "PROJ-10"), Ordering::Equal);
        assert_eq!(compare_issue_keys("ABC-99", "PROJ-1"), Ordering::Less);
        assert_eq!(compare_issue_keys("weird", "PROJ-1"), "weird".cmp("PROJ-1"));
    }

    #[test]
    fn test_change_item_touches() {
        let with_id = ChangeItem {
            field: "Story Points".into(),
            field_id: Some("customfield_10016".into()),
            from: None,
            to: Some("3".into()),
        };
        assert!(with_id.touches("customfield_10016"));
        assert!(!with_id.touches("Story Points"));

        let legacy = ChangeItem {
            field: "Status".into(),
            field_id: None,
            from: Some("To Do".into()),
            to: Some("Done".into()),
        };
        assert!(legacy.touches("status"));
    }
}
