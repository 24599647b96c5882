//! Notion capability.
//!
//! The engine reads database schemas and reads/writes pages only through
//! [`NotionApi`]. [`client::HttpNotionClient`] is the HTTP implementation.

pub mod client;

pub use client::HttpNotionClient;

use crate::error::Result;
use crate::model::{DatabaseSchema, NotionPageRef, PageDraft, PropertyValue};
use std::collections::BTreeMap;
use std::future::Future;

/// Page and schema access for Notion databases.
pub trait NotionApi: Send + Sync {
    /// Find the page mirroring `issue_key`, if any.
    ///
    /// Matches on the configured issue key property.
    fn find_page_by_issue_key(
        &self,
        database_id: &str,
        issue_key: &str,
    ) -> impl Future<Output = Result<Option<NotionPageRef>>> + Send;

    /// Create a page and return its id.
    fn create_page(
        &self,
        database_id: &str,
        draft: &PageDraft,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Patch only the given properties of an existing page.
    ///
    /// A page that no longer exists yields an error whose kind is `NotFound`.
    fn update_page(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Live property schema of a database.
    fn get_database_schema(
        &self,
        database_id: &str,
    ) -> impl Future<Output = Result<DatabaseSchema>> + Send;

    /// Verify that the token is valid and the database is shared with it.
    fn check_connection(&self, database_id: &str) -> impl Future<Output = Result<()>> + Send;
}
