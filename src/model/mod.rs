//! Data models for jira2notion.
//!
//! This module contains the core data types:
//! - [`ProjectConfig`] - A Jira project mirrored into a Notion database
//! - [`IssueRecord`] - A fetched Jira issue (transient, one sync pass)
//! - [`Checkpoint`] - Per-project high-water mark of synced issues
//! - [`NotionPageRef`] / [`DatabaseSchema`] - Notion-side page and schema types

mod checkpoint;
mod issue;
mod notion;
mod project;

pub use checkpoint::{Checkpoint, RetryEntry};
pub use issue::{Assignee, ChangeItem, ChangelogEntry, IssueRecord, compare_issue_keys};
pub use notion::{
    Block, CHILDREN_LIMIT, DatabaseSchema, NotionPageRef, PageDraft, PropertyKind, PropertySchema,
    PropertyValue,
};
pub use project::ProjectConfig;
