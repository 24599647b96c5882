//! In-memory Jira, Notion and checkpoint fakes for engine tests.
//!
//! `FakeJira` evaluates the small JQL subset the query builder emits
//! (`created >=`, `updated >=`, `key in`, `assignee =`, `ORDER BY`), so
//! tests exercise the real queries instead of canned responses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::json;

use crate::config::DEFAULT_ISSUE_KEY_PROPERTY;
use crate::error::{Error, Result, Service};
use crate::jira::JiraApi;
use crate::model::{
    Assignee, ChangeItem, ChangelogEntry, Checkpoint, DatabaseSchema, IssueRecord,
    NotionPageRef, PageDraft, PropertyKind, PropertySchema, PropertyValue, RetryEntry,
};
use crate::notion::NotionApi;
use crate::storage::{CheckpointStore, SqliteCheckpointStore};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// An issue with a summary and a status.
pub fn issue(key: &str, created: i64, updated: i64) -> IssueRecord {
    IssueRecord::new(key, at(created), at(updated))
        .with_field("summary", json!(format!("Summary of {key}")))
        .with_field("status", json!({"name": "To Do"}))
        .with_field("created", json!(at(created).to_rfc3339()))
}

pub fn status_change(when: i64, to: &str) -> ChangelogEntry {
    ChangelogEntry {
        created: at(when),
        items: vec![ChangeItem {
            field: "status".into(),
            field_id: Some("status".into()),
            from: Some("To Do".into()),
            to: Some(to.into()),
        }],
    }
}

pub fn untracked_change(when: i64) -> ChangelogEntry {
    ChangelogEntry {
        created: at(when),
        items: vec![ChangeItem {
            field: "Sprint".into(),
            field_id: Some("customfield_10020".into()),
            from: None,
            to: Some("Sprint 7".into()),
        }],
    }
}

/// Schema with the default key property plus the default mapping's targets.
pub fn full_schema() -> DatabaseSchema {
    DatabaseSchema::default()
        .with(DEFAULT_ISSUE_KEY_PROPERTY, PropertySchema::new(PropertyKind::RichText))
        .with("Name", PropertySchema::new(PropertyKind::Title))
        .with(
            "Status",
            PropertySchema::with_options(PropertyKind::Status, ["To Do", "In Progress", "Done"]),
        )
        .with(
            "Priority",
            PropertySchema::with_options(PropertyKind::Select, ["High", "Low"]),
        )
        .with("Created", PropertySchema::new(PropertyKind::Date))
        .with("Verified", PropertySchema::new(PropertyKind::Checkbox))
}

// ── Jira ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeJira {
    issues: Mutex<Vec<IssueRecord>>,
    changelogs: Mutex<HashMap<String, Vec<ChangelogEntry>>>,
    queries: Mutex<Vec<String>>,
    changelog_calls: AtomicUsize,
    fail_search: Mutex<Option<u16>>,
    fail_retry_search: AtomicBool,
}

impl FakeJira {
    pub fn with_issues(issues: Vec<IssueRecord>) -> Self {
        let fake = Self::default();
        *fake.issues.lock().unwrap() = issues;
        fake
    }

    pub fn put(&self, issue: IssueRecord) {
        let mut issues = self.issues.lock().unwrap();
        issues.retain(|i| i.issue_key != issue.issue_key);
        issues.push(issue);
    }

    pub fn set_changelog(&self, issue_key: &str, entries: Vec<ChangelogEntry>) {
        self.changelogs
            .lock()
            .unwrap()
            .insert(issue_key.to_string(), entries);
    }

    /// Fail every search with this HTTP status (`None` to recover).
    pub fn fail_searches(&self, status: Option<u16>) {
        *self.fail_search.lock().unwrap() = status;
    }

    pub fn fail_retry_searches(&self, fail: bool) {
        self.fail_retry_search.store(fail, Ordering::SeqCst);
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn changelog_calls(&self) -> usize {
        self.changelog_calls.load(Ordering::SeqCst)
    }

    fn evaluate(&self, jql: &str) -> Vec<IssueRecord> {
        let mut matched: Vec<IssueRecord> = self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|issue| {
                project(jql).is_none_or(|key| issue.issue_key.starts_with(&format!("{key}-")))
                    && bound(jql, "created >= \"").is_none_or(|b| issue.created >= b)
                    && bound(jql, "updated >= \"").is_none_or(|b| issue.updated >= b)
                    && key_list(jql).is_none_or(|keys| keys.contains(&issue.issue_key))
                    && assignee(jql).is_none_or(|who| assigned_to(issue, &who))
            })
            .cloned()
            .collect();

        if jql.contains("ORDER BY updated") {
            matched.sort_by_key(|i| i.updated);
        } else {
            matched.sort_by_key(|i| i.created);
        }
        matched
    }
}

fn project(jql: &str) -> Option<String> {
    let start = jql.find("project = \"")? + "project = \"".len();
    let end = start + jql[start..].find('"')?;
    Some(jql[start..end].to_string())
}

fn bound(jql: &str, marker: &str) -> Option<DateTime<Utc>> {
    let start = jql.find(marker)? + marker.len();
    let literal = jql.get(start..start + 16)?;
    NaiveDateTime::parse_from_str(literal, "%Y-%m-%d %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

fn key_list(jql: &str) -> Option<HashSet<String>> {
    let start = jql.find("key in (")? + "key in (".len();
    let end = start + jql[start..].find(')')?;
    Some(
        jql[start..end]
            .split(',')
            .map(|k| k.trim().trim_matches('"').to_string())
            .collect(),
    )
}

fn assignee(jql: &str) -> Option<String> {
    let start = jql.find("assignee = ")? + "assignee = ".len();
    let rest = &jql[start..];
    let end = rest.find(" ORDER BY").unwrap_or(rest.len());
    Some(rest[..end].trim().trim_matches('"').to_string())
}

fn assigned_to(issue: &IssueRecord, who: &str) -> bool {
    let Some(Assignee {
        account_id,
        email_address,
        ..
    }) = &issue.assignee
    else {
        return false;
    };
    who == "currentUser()"
        || account_id.as_deref() == Some(who)
        || email_address.as_deref() == Some(who)
}

impl JiraApi for FakeJira {
    async fn search_issues(&self, jql: &str, _fields: &[String]) -> Result<Vec<IssueRecord>> {
        self.queries.lock().unwrap().push(jql.to_string());
        if let Some(status) = *self.fail_search.lock().unwrap() {
            return Err(Error::api(Service::Jira, status, "search failed"));
        }
        if jql.contains("key in (") && self.fail_retry_search.load(Ordering::SeqCst) {
            return Err(Error::api(Service::Jira, 503, "retry search failed"));
        }
        Ok(self.evaluate(jql))
    }

    async fn get_changelog(&self, issue_key: &str) -> Result<Vec<ChangelogEntry>> {
        self.changelog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .changelogs
            .lock()
            .unwrap()
            .get(issue_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }
}

// ── Notion ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPage {
    pub database_id: String,
    pub issue_key: String,
    pub properties: BTreeMap<String, PropertyValue>,
}

pub struct FakeNotion {
    schema: Mutex<DatabaseSchema>,
    pages: Mutex<BTreeMap<String, StoredPage>>,
    creates: Mutex<Vec<PageDraft>>,
    updates: Mutex<Vec<(String, BTreeMap<String, PropertyValue>)>>,
    next_id: AtomicUsize,
    fail_writes_for: Mutex<HashSet<String>>,
    fail_schema: AtomicBool,
    /// Pages `find` still reports but `update` answers 404 for.
    stale: Mutex<HashSet<String>>,
}

impl FakeNotion {
    pub fn new(schema: DatabaseSchema) -> Self {
        Self {
            schema: Mutex::new(schema),
            pages: Mutex::new(BTreeMap::new()),
            creates: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            fail_writes_for: Mutex::new(HashSet::new()),
            fail_schema: AtomicBool::new(false),
            stale: Mutex::new(HashSet::new()),
        }
    }

    /// Pre-existing page for an issue. Returns its id.
    pub fn seed_page(&self, database_id: &str, issue_key: &str) -> String {
        let id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pages.lock().unwrap().insert(
            id.clone(),
            StoredPage {
                database_id: database_id.to_string(),
                issue_key: issue_key.to_string(),
                properties: BTreeMap::new(),
            },
        );
        id
    }

    /// Make create/update fail with a 503 for this issue (`false` to recover).
    pub fn fail_writes(&self, issue_key: &str, fail: bool) {
        let mut set = self.fail_writes_for.lock().unwrap();
        if fail {
            set.insert(issue_key.to_string());
        } else {
            set.remove(issue_key);
        }
    }

    pub fn fail_schema(&self, fail: bool) {
        self.fail_schema.store(fail, Ordering::SeqCst);
    }

    pub fn mark_stale(&self, page_id: &str) {
        self.stale.lock().unwrap().insert(page_id.to_string());
    }

    pub fn creates(&self) -> Vec<PageDraft> {
        self.creates.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, BTreeMap<String, PropertyValue>)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn page_count(&self) -> usize {
        self.pages.lock().unwrap().len()
    }

    pub fn pages_for(&self, issue_key: &str) -> Vec<StoredPage> {
        self.pages
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.issue_key == issue_key)
            .cloned()
            .collect()
    }

    fn key_of(draft: &PageDraft) -> Option<String> {
        match draft.properties.get(DEFAULT_ISSUE_KEY_PROPERTY)? {
            PropertyValue::RichText(key) | PropertyValue::Title(key) => Some(key.clone()),
            _ => None,
        }
    }

    fn should_fail(&self, issue_key: &str) -> bool {
        self.fail_writes_for.lock().unwrap().contains(issue_key)
    }
}

impl NotionApi for FakeNotion {
    async fn find_page_by_issue_key(
        &self,
        database_id: &str,
        issue_key: &str,
    ) -> Result<Option<NotionPageRef>> {
        Ok(self
            .pages
            .lock()
            .unwrap()
            .iter()
            .find(|(_, p)| p.database_id == database_id && p.issue_key == issue_key)
            .map(|(id, _)| NotionPageRef {
                notion_page_id: id.clone(),
                issue_key: issue_key.to_string(),
            }))
    }

    async fn create_page(&self, database_id: &str, draft: &PageDraft) -> Result<String> {
        let issue_key = Self::key_of(draft).unwrap_or_default();
        if self.should_fail(&issue_key) {
            return Err(Error::api(Service::Notion, 503, "service unavailable"));
        }
        self.creates.lock().unwrap().push(draft.clone());
        let id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.pages.lock().unwrap().insert(
            id.clone(),
            StoredPage {
                database_id: database_id.to_string(),
                issue_key,
                properties: draft.properties.clone(),
            },
        );
        Ok(id)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<()> {
        if self.stale.lock().unwrap().contains(page_id) {
            return Err(Error::api(Service::Notion, 404, "object_not_found"));
        }
        let issue_key = self
            .pages
            .lock()
            .unwrap()
            .get(page_id)
            .map(|p| p.issue_key.clone())
            .ok_or_else(|| Error::api(Service::Notion, 404, "object_not_found"))?;
        if self.should_fail(&issue_key) {
            return Err(Error::api(Service::Notion, 503, "service unavailable"));
        }

        self.updates
            .lock()
            .unwrap()
            .push((page_id.to_string(), properties.clone()));
        if let Some(page) = self.pages.lock().unwrap().get_mut(page_id) {
            page.properties.extend(properties.clone());
        }
        Ok(())
    }

    async fn get_database_schema(&self, _database_id: &str) -> Result<DatabaseSchema> {
        if self.fail_schema.load(Ordering::SeqCst) {
            return Err(Error::api(Service::Notion, 502, "bad gateway"));
        }
        Ok(self.schema.lock().unwrap().clone())
    }

    async fn check_connection(&self, _database_id: &str) -> Result<()> {
        Ok(())
    }
}

// ── Checkpoint store ──────────────────────────────────────────

/// SQLite store whose writes can be made to fail on demand.
pub struct FlakyStore {
    inner: SqliteCheckpointStore,
    fail_advance: AtomicBool,
    fail_get: AtomicBool,
    advance_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteCheckpointStore::open_memory().unwrap(),
            fail_advance: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            advance_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_advance(&self, fail: bool) {
        self.fail_advance.store(fail, Ordering::SeqCst);
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn advance_calls(&self) -> usize {
        self.advance_calls.load(Ordering::SeqCst)
    }
}

impl CheckpointStore for FlakyStore {
    fn get(&self, project_key: &str) -> Result<Option<Checkpoint>> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Error::Persistence("database is locked".into()));
        }
        self.inner.get(project_key)
    }

    fn advance(&self, project_key: &str, issue_key: &str, timestamp: DateTime<Utc>) -> Result<bool> {
        self.advance_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_advance.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk I/O error".into()));
        }
        self.inner.advance(project_key, issue_key, timestamp)
    }

    fn pending_retries(&self, project_key: &str) -> Result<Vec<RetryEntry>> {
        self.inner.pending_retries(project_key)
    }

    fn defer(&self, project_key: &str, issue_key: &str, error: &str) -> Result<()> {
        self.inner.defer(project_key, issue_key, error)
    }

    fn settle(&self, project_key: &str, issue_key: &str) -> Result<bool> {
        self.inner.settle(project_key, issue_key)
    }

    fn list(&self) -> Result<Vec<Checkpoint>> {
        self.inner.list()
    }

    fn reset(&self, project_key: &str) -> Result<bool> {
        self.inner.reset(project_key)
    }

    fn claim_lease(&self, project_key: &str, holder: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        self.inner.claim_lease(project_key, holder, expires_at)
    }

    fn release_lease(&self, project_key: &str, holder: &str) -> Result<bool> {
        self.inner.release_lease(project_key, holder)
    }
}
