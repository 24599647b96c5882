//! The per-project sync engine.
//!
//! One call to [`SyncEngine::sync_project`] performs a batch for a single
//! project:
//!
//! 1. Read the checkpoint once and derive the window lower bound from it.
//! 2. **New-issue pass**: retry issues deferred by earlier batches, then
//!    create a page for every issue created after the checkpoint that
//!    Notion does not already have.
//! 3. **Updated-issue pass**: for issues updated after the checkpoint,
//!    patch only the properties whose Jira fields changed in the window.
//!
//! Issues are processed oldest first and the checkpoint advances after each
//! successful issue. An issue that fails is moved to the retry set and the
//! batch continues. If the checkpoint store cannot be written the batch
//! stops: nothing may be written to Notion that the store does not account for.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::{
    DEFAULT_BODY_FIELD, DEFAULT_ISSUE_KEY_PROPERTY, DEFAULT_LOOKBACK_MINUTES, FieldMapping, Settings,
};
use crate::error::{Error, ErrorKind, Result};
use crate::jira::JiraApi;
use crate::model::{
    Block, CHILDREN_LIMIT, ChangelogEntry, Checkpoint, DatabaseSchema, IssueRecord, NotionPageRef, PageDraft,
    ProjectConfig, PropertyKind, PropertyValue, compare_issue_keys,
};
use crate::notion::NotionApi;
use crate::storage::CheckpointStore;

use super::flight::{DEFAULT_LEASE_TTL_SECS, FlightPermit, ProjectLocks};
use super::mapper::{FieldMapper, MappedProperties, to_text};
use super::query::QueryBuilder;
use super::types::{IssueError, SyncResult};

/// Failed attempts after which a deferred issue is dropped from the retry set.
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 10;

const ISSUE_LINK_LABEL: &str = "Issue URL: ";

/// Engine knobs that do not belong to a single project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Database used by projects that do not name their own.
    pub default_database_id: Option<String>,
    /// Text or title property holding the Jira issue key.
    pub issue_key_property: String,
    /// Checkbox reset to unchecked by user syncs.
    pub verified_property: Option<String>,
    /// Jira site URL for the issue link block. Empty disables the block.
    pub jira_base_url: String,
    /// Jira field rendered as paragraphs below the link block.
    pub body_field: Option<String>,
    /// Window for a project with no checkpoint. 0 means unbounded.
    pub lookback_minutes: i64,
    pub max_retry_attempts: u32,
    /// Lifetime of a project's sync lease between renewals.
    pub lease_ttl: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_database_id: None,
            issue_key_property: DEFAULT_ISSUE_KEY_PROPERTY.to_string(),
            verified_property: None,
            jira_base_url: String::new(),
            body_field: Some(DEFAULT_BODY_FIELD.to_string()),
            lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            lease_ttl: Duration::seconds(DEFAULT_LEASE_TTL_SECS),
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            default_database_id: settings.notion.default_database_id.clone(),
            issue_key_property: settings.notion.issue_key_property.clone(),
            verified_property: settings.notion.verified_property.clone(),
            jira_base_url: settings.jira.base_url.clone(),
            body_field: settings.notion.body_field.clone(),
            lookback_minutes: settings.lookback_minutes,
            ..Self::default()
        }
    }
}

/// The Notion database a project writes to, resolved for one batch.
struct Target {
    database_id: String,
    schema: DatabaseSchema,
    key_kind: PropertyKind,
}

/// Lower bound of a batch.
struct Window {
    checkpoint: Option<Checkpoint>,
    since: Option<DateTime<Utc>>,
}

impl Window {
    fn unbounded() -> Self {
        Self {
            checkpoint: None,
            since: None,
        }
    }

    fn admits(&self, issue_key: &str, timestamp: DateTime<Utc>) -> bool {
        self.checkpoint
            .as_ref()
            .is_none_or(|cp| cp.admits(issue_key, timestamp))
    }

    fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| timestamp > since)
    }
}

/// State carried through one batch.
struct Batch<'a> {
    project: &'a ProjectConfig,
    target: Target,
    window: Window,
    retry_keys: HashSet<String>,
    /// Issues the new-issue pass already handled, with the `updated` it saw.
    handled: HashMap<String, DateTime<Utc>>,
    result: SyncResult,
    halted: bool,
}

impl Batch<'_> {
    fn warn_all(&mut self, issue_key: &str, mapped: &mut MappedProperties) {
        for warning in mapped.warnings.drain(..) {
            warn!(
                project = %self.project.key,
                issue = issue_key,
                property = %warning.property,
                reason = %warning.reason,
                "Property dropped"
            );
            self.result.record_warning(issue_key, &warning.into_error());
        }
    }
}

/// What a successful issue sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Created,
    Updated,
    Skipped,
}

/// How an issue outcome is booked in the checkpoint store.
#[derive(Debug, Clone, Copy)]
enum Bookkeeping {
    /// Advance the checkpoint to this timestamp on success, defer on failure.
    Checkpointed(DateTime<Utc>),
    /// Touch nothing in the store.
    Detached,
}

/// Synchronizes Jira projects into Notion databases.
///
/// Generic over its collaborators so tests can substitute in-memory fakes.
/// Single flight is enforced through leases in the checkpoint store, so
/// engines in different processes exclude each other as well.
pub struct SyncEngine<J, N, S> {
    jira: Arc<J>,
    notion: Arc<N>,
    store: Arc<S>,
    mapper: FieldMapper,
    queries: QueryBuilder,
    options: EngineOptions,
    fields: Vec<String>,
    locks: ProjectLocks<S>,
}

impl<J, N, S> Clone for SyncEngine<J, N, S> {
    fn clone(&self) -> Self {
        Self {
            jira: Arc::clone(&self.jira),
            notion: Arc::clone(&self.notion),
            store: Arc::clone(&self.store),
            mapper: self.mapper.clone(),
            queries: self.queries,
            options: self.options.clone(),
            fields: self.fields.clone(),
            locks: self.locks.clone(),
        }
    }
}

impl<J, N, S> SyncEngine<J, N, S>
where
    J: JiraApi,
    N: NotionApi,
    S: CheckpointStore,
{
    pub fn new(
        jira: Arc<J>,
        notion: Arc<N>,
        store: Arc<S>,
        mapping: Arc<FieldMapping>,
        options: EngineOptions,
    ) -> Self {
        let mut fields = mapping.jira_fields();
        if let Some(body) = options.body_field.as_ref() {
            if !fields.contains(body) {
                fields.push(body.clone());
            }
        }
        let locks = ProjectLocks::new(Arc::clone(&store), options.lease_ttl);
        Self {
            jira,
            notion,
            store,
            mapper: FieldMapper::new(mapping),
            queries: QueryBuilder::default(),
            options,
            fields,
            locks,
        }
    }

    #[must_use]
    pub fn with_query_builder(mut self, queries: QueryBuilder) -> Self {
        self.queries = queries;
        self
    }

    /// Full batch: new-issue pass, then updated-issue pass.
    ///
    /// The checkpoint is read once, so both passes share the same window.
    ///
    /// # Errors
    ///
    /// Returns an error when the project as a whole cannot be synced:
    /// another sync of it is running, the checkpoint cannot be read, the
    /// schema or a search cannot be fetched, or the database is misconfigured.
    /// Per-issue failures are reported in the returned [`SyncResult`].
    pub async fn sync_project(&self, project: &ProjectConfig) -> Result<SyncResult> {
        let mut lease = self.locks.try_acquire(&project.key)?;
        let mut batch = self.begin(project).await?;
        self.new_issue_pass(&mut batch, &mut lease).await?;
        if !batch.halted {
            self.updated_issue_pass(&mut batch, &mut lease).await?;
        }
        Ok(self.finish(batch))
    }

    /// Create pages for issues created since the checkpoint.
    ///
    /// Also retries issues deferred by earlier batches.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_project`].
    pub async fn sync_new_issues(&self, project: &ProjectConfig) -> Result<SyncResult> {
        let mut lease = self.locks.try_acquire(&project.key)?;
        let mut batch = self.begin(project).await?;
        self.new_issue_pass(&mut batch, &mut lease).await?;
        Ok(self.finish(batch))
    }

    /// Patch pages for issues updated since the checkpoint.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_project`].
    pub async fn sync_updated_issues(&self, project: &ProjectConfig) -> Result<SyncResult> {
        let mut lease = self.locks.try_acquire(&project.key)?;
        let mut batch = self.begin(project).await?;
        self.updated_issue_pass(&mut batch, &mut lease).await?;
        Ok(self.finish(batch))
    }

    /// Upsert every issue of the project assigned to `assignee`.
    ///
    /// No time bound, and the checkpoint and retry set are left alone. Pages
    /// written here get the verified checkbox reset, if one is configured.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::sync_project`].
    pub async fn sync_user_issues(
        &self,
        project: &ProjectConfig,
        assignee: &str,
    ) -> Result<SyncResult> {
        let mut lease = self.locks.try_acquire(&project.key)?;
        let target = self.prepare(project).await?;
        let jql = self.queries.build_user_issues_query(project, assignee);
        let issues = self.jira.search_issues(&jql, &self.fields).await?;
        debug!(project = %project.key, assignee, fetched = issues.len(), "User sync");

        let mut batch = Batch {
            project,
            target,
            window: Window::unbounded(),
            retry_keys: HashSet::new(),
            handled: HashMap::new(),
            result: SyncResult::default(),
            halted: false,
        };
        for issue in &issues {
            if !self.keep_lease(&mut batch, &mut lease, issue) {
                break;
            }
            let outcome = self.upsert(&mut batch, issue, true).await;
            self.conclude(&mut batch, issue, outcome, Bookkeeping::Detached);
        }
        Ok(self.finish(batch))
    }

    // ── batch setup ───────────────────────────────────────────

    async fn begin<'a>(&self, project: &'a ProjectConfig) -> Result<Batch<'a>> {
        let target = self.prepare(project).await?;
        let window = self.window(project)?;
        debug!(
            project = %project.key,
            since = ?window.since,
            checkpoint = ?window.checkpoint.as_ref().map(|cp| &cp.last_issue_id),
            "Batch window"
        );

        let mut batch = Batch {
            project,
            target,
            window,
            retry_keys: HashSet::new(),
            handled: HashMap::new(),
            result: SyncResult::default(),
            halted: false,
        };

        for entry in self.store.pending_retries(&project.key)? {
            if entry.attempts >= self.options.max_retry_attempts {
                warn!(
                    project = %project.key,
                    issue = %entry.issue_key,
                    attempts = entry.attempts,
                    "Giving up on issue after repeated failures"
                );
                self.store.settle(&project.key, &entry.issue_key)?;
                let reason = entry
                    .last_error
                    .unwrap_or_else(|| "unknown error".to_string());
                batch.result.record_warning(
                    &entry.issue_key,
                    &Error::Other(format!(
                        "Dropped from retry set after {} attempts: {reason}",
                        entry.attempts
                    )),
                );
            } else {
                batch.retry_keys.insert(entry.issue_key);
            }
        }
        Ok(batch)
    }

    /// Resolve the project's database and fetch its schema.
    async fn prepare(&self, project: &ProjectConfig) -> Result<Target> {
        let database_id = project
            .database_id(self.options.default_database_id.as_deref())
            .ok_or_else(|| {
                Error::Config(format!(
                    "No Notion database configured for project {}",
                    project.key
                ))
            })?
            .to_string();

        let schema = self.notion.get_database_schema(&database_id).await?;
        let key_property = &self.options.issue_key_property;
        let key_kind = match schema.get(key_property).map(|p| p.kind) {
            Some(kind @ (PropertyKind::RichText | PropertyKind::Title)) => kind,
            Some(other) => {
                return Err(Error::Config(format!(
                    "Property '{key_property}' in database {database_id} is {other:?}, expected rich_text or title"
                )));
            }
            None => {
                return Err(Error::Config(format!(
                    "Notion database {database_id} has no '{key_property}' property"
                )));
            }
        };

        Ok(Target {
            database_id,
            schema,
            key_kind,
        })
    }

    fn window(&self, project: &ProjectConfig) -> Result<Window> {
        let checkpoint = self.store.get(&project.key)?;
        let since = match &checkpoint {
            Some(cp) => Some(cp.last_seen_timestamp),
            None if self.options.lookback_minutes > 0 => {
                Some(Utc::now() - Duration::minutes(self.options.lookback_minutes))
            }
            None => None,
        };
        Ok(Window { checkpoint, since })
    }

    fn finish(&self, batch: Batch<'_>) -> SyncResult {
        let result = batch.result;
        info!(
            project = %batch.project.key,
            processed = result.processed_count,
            created = result.created_count,
            updated = result.updated_count,
            skipped = result.skipped_count,
            errors = result.errors.len(),
            halted = batch.halted,
            "Project sync finished"
        );
        result
    }

    // ── passes ────────────────────────────────────────────────

    async fn new_issue_pass(&self, batch: &mut Batch<'_>, lease: &mut FlightPermit<S>) -> Result<()> {
        let mut candidates = self.fetch_retries(batch).await;

        let jql = self
            .queries
            .build_new_issues_query(batch.project, batch.window.since);
        let fresh = self.jira.search_issues(&jql, &self.fields).await?;
        let fetched = fresh.len();
        for issue in fresh {
            let known = candidates.iter().any(|c| c.issue_key == issue.issue_key);
            if !known && batch.window.admits(&issue.issue_key, issue.created) {
                candidates.push(issue);
            }
        }
        candidates.sort_by(|a, b| {
            a.created
                .cmp(&b.created)
                .then_with(|| compare_issue_keys(&a.issue_key, &b.issue_key))
        });
        debug!(
            project = %batch.project.key,
            fetched,
            candidates = candidates.len(),
            retries = batch.retry_keys.len(),
            "New-issue pass"
        );

        for issue in &candidates {
            if !self.keep_lease(batch, lease, issue) {
                break;
            }
            let outcome = if batch.retry_keys.contains(&issue.issue_key) {
                self.upsert(batch, issue, false).await
            } else {
                self.create_if_absent(batch, issue).await
            };
            batch.handled.insert(issue.issue_key.clone(), issue.updated);
            if !self.conclude(batch, issue, outcome, Bookkeeping::Checkpointed(issue.created)) {
                break;
            }
        }
        Ok(())
    }

    async fn updated_issue_pass(&self, batch: &mut Batch<'_>, lease: &mut FlightPermit<S>) -> Result<()> {
        let jql = self
            .queries
            .build_updated_issues_query(batch.project, batch.window.since);
        let mut candidates: Vec<IssueRecord> = self
            .jira
            .search_issues(&jql, &self.fields)
            .await?
            .into_iter()
            .filter(|issue| batch.window.admits(&issue.issue_key, issue.updated))
            .collect();
        candidates.sort_by(|a, b| {
            a.updated
                .cmp(&b.updated)
                .then_with(|| compare_issue_keys(&a.issue_key, &b.issue_key))
        });
        debug!(project = %batch.project.key, candidates = candidates.len(), "Updated-issue pass");

        for issue in &candidates {
            if batch.handled.get(&issue.issue_key) == Some(&issue.updated) {
                debug!(issue = %issue.issue_key, "Already handled by new-issue pass");
                continue;
            }
            if !self.keep_lease(batch, lease, issue) {
                break;
            }
            let outcome = self.apply_update(batch, issue).await;
            if !self.conclude(batch, issue, outcome, Bookkeeping::Checkpointed(issue.updated)) {
                break;
            }
        }
        Ok(())
    }

    /// Fetch the deferred issues that are due. A failed fetch leaves them
    /// deferred for the next batch.
    async fn fetch_retries(&self, batch: &mut Batch<'_>) -> Vec<IssueRecord> {
        let mut keys: Vec<String> = batch.retry_keys.iter().cloned().collect();
        keys.sort_by(|a, b| compare_issue_keys(a, b));
        let Some(jql) = self.queries.build_retry_query(batch.project, &keys) else {
            return Vec::new();
        };

        let issues = match self.jira.search_issues(&jql, &self.fields).await {
            Ok(issues) => issues,
            Err(e) => {
                warn!(project = %batch.project.key, error = %e, "Could not fetch deferred issues");
                for key in &keys {
                    batch.result.record_warning(key, &e);
                }
                batch.retry_keys.clear();
                return Vec::new();
            }
        };

        // Deleted, moved or filtered out: nothing left to retry.
        for key in &keys {
            if !issues.iter().any(|i| &i.issue_key == key) {
                debug!(issue = %key, "Deferred issue no longer matches; dropping");
                batch.retry_keys.remove(key);
                if let Err(e) = self.store.settle(&batch.project.key, key) {
                    warn!(issue = %key, error = %e, "Could not drop deferred issue");
                }
            }
        }
        issues
    }

    // ── per-issue operations ──────────────────────────────────

    /// New-issue path: create the page unless one already exists.
    async fn create_if_absent(&self, batch: &mut Batch<'_>, issue: &IssueRecord) -> Result<Applied> {
        if self.find_page(batch, issue).await?.is_some() {
            debug!(issue = %issue.issue_key, "Page already exists");
            return Ok(Applied::Skipped);
        }
        self.create(batch, issue, false).await?;
        Ok(Applied::Created)
    }

    /// Updated-issue path.
    ///
    /// Issues created inside the window are new issues first: if no page
    /// exists one is created. Otherwise only properties whose Jira fields
    /// appear in the window's changelog are patched.
    async fn apply_update(&self, batch: &mut Batch<'_>, issue: &IssueRecord) -> Result<Applied> {
        let mut page = None;
        if batch.window.contains(issue.created) {
            match self.find_page(batch, issue).await? {
                Some(found) => page = Some(found),
                None => {
                    self.create(batch, issue, false).await?;
                    return Ok(Applied::Created);
                }
            }
        }

        let changelog = if issue.changelog.is_empty() {
            self.jira.get_changelog(&issue.issue_key).await?
        } else {
            issue.changelog.clone()
        };
        let changed = self.changed_fields(&changelog, batch.window.since);
        if changed.is_empty() {
            debug!(issue = %issue.issue_key, "No tracked field changed");
            return Ok(Applied::Skipped);
        }

        let selected: Vec<&str> = changed.iter().map(String::as_str).collect();
        let mut mapped = self
            .mapper
            .map_selected(&issue.fields, &batch.target.schema, &selected);
        batch.warn_all(&issue.issue_key, &mut mapped);
        if mapped.properties.is_empty() {
            debug!(issue = %issue.issue_key, changed = ?changed, "Changed fields map to no writable property");
            return Ok(Applied::Skipped);
        }

        let page = match page {
            Some(page) => page,
            None => match self.find_page(batch, issue).await? {
                Some(page) => page,
                None => {
                    info!(issue = %issue.issue_key, "No page to update; creating one");
                    self.create(batch, issue, false).await?;
                    return Ok(Applied::Created);
                }
            },
        };
        self.patch_or_recreate(batch, issue, &page, &mapped.properties, false)
            .await
    }

    /// Write the full mapping: update the page if it exists, else create it.
    async fn upsert(
        &self,
        batch: &mut Batch<'_>,
        issue: &IssueRecord,
        reset_verified: bool,
    ) -> Result<Applied> {
        let Some(page) = self.find_page(batch, issue).await? else {
            self.create(batch, issue, reset_verified).await?;
            return Ok(Applied::Created);
        };

        let mut mapped = self.mapper.map_fields(&issue.fields, &batch.target.schema);
        batch.warn_all(&issue.issue_key, &mut mapped);
        let mut properties = mapped.properties;
        if reset_verified {
            self.insert_verified_reset(&batch.target, &mut properties);
        }
        if properties.is_empty() {
            return Ok(Applied::Skipped);
        }
        self.patch_or_recreate(batch, issue, &page, &properties, reset_verified)
            .await
    }

    async fn patch_or_recreate(
        &self,
        batch: &mut Batch<'_>,
        issue: &IssueRecord,
        page: &NotionPageRef,
        properties: &BTreeMap<String, PropertyValue>,
        reset_verified: bool,
    ) -> Result<Applied> {
        match self.notion.update_page(&page.notion_page_id, properties).await {
            Ok(()) => {
                info!(
                    project = %batch.project.key,
                    issue = %issue.issue_key,
                    page_id = %page.notion_page_id,
                    properties = properties.len(),
                    "Updated Notion page"
                );
                Ok(Applied::Updated)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(
                    issue = %issue.issue_key,
                    page_id = %page.notion_page_id,
                    "Page vanished before update; creating a new one"
                );
                self.create(batch, issue, reset_verified).await?;
                Ok(Applied::Created)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_page(&self, batch: &Batch<'_>, issue: &IssueRecord) -> Result<Option<NotionPageRef>> {
        self.notion
            .find_page_by_issue_key(&batch.target.database_id, &issue.issue_key)
            .await
    }

    async fn create(&self, batch: &mut Batch<'_>, issue: &IssueRecord, reset_verified: bool) -> Result<()> {
        let draft = self.build_draft(batch, issue, reset_verified);
        let page_id = self
            .notion
            .create_page(&batch.target.database_id, &draft)
            .await?;
        info!(
            project = %batch.project.key,
            issue = %issue.issue_key,
            page_id = %page_id,
            "Created Notion page"
        );
        Ok(())
    }

    /// Page defaults, overridden by the mapped fields, plus the issue key.
    /// The body holds a link back to Jira followed by the body field.
    fn build_draft(&self, batch: &mut Batch<'_>, issue: &IssueRecord, reset_verified: bool) -> PageDraft {
        let schema = &batch.target.schema;
        let mut defaults = self.mapper.map_defaults(schema);
        let mut mapped = self.mapper.map_fields(&issue.fields, schema);
        let key_kind = batch.target.key_kind;

        let mut properties = std::mem::take(&mut defaults.properties);
        properties.append(&mut mapped.properties);
        let key_value = match key_kind {
            PropertyKind::Title => PropertyValue::Title(issue.issue_key.clone()),
            _ => PropertyValue::RichText(issue.issue_key.clone()),
        };
        properties.insert(self.options.issue_key_property.clone(), key_value);
        if reset_verified {
            self.insert_verified_reset(&batch.target, &mut properties);
        }

        batch.warn_all(&issue.issue_key, &mut defaults);
        batch.warn_all(&issue.issue_key, &mut mapped);

        let mut children = Vec::new();
        if !self.options.jira_base_url.is_empty() {
            children.push(Block::Link {
                label: ISSUE_LINK_LABEL.to_string(),
                text: issue.issue_key.clone(),
                url: format!(
                    "{}/browse/{}",
                    self.options.jira_base_url.trim_end_matches('/'),
                    issue.issue_key
                ),
            });
        }
        if let Some(text) = self
            .options
            .body_field
            .as_deref()
            .and_then(|field| issue.fields.get(field))
            .and_then(to_text)
        {
            let mut body = Block::paragraphs(&text);
            let room = CHILDREN_LIMIT - children.len();
            if body.len() > room {
                warn!(issue = %issue.issue_key, blocks = body.len(), kept = room, "Page body truncated");
                batch.result.record_warning(
                    &issue.issue_key,
                    &Error::Other(format!(
                        "Page body truncated to {room} of {} paragraphs",
                        body.len()
                    )),
                );
                body.truncate(room);
            }
            children.append(&mut body);
        }
        PageDraft {
            properties,
            children,
        }
    }

    fn insert_verified_reset(
        &self,
        target: &Target,
        properties: &mut BTreeMap<String, PropertyValue>,
    ) {
        let Some(name) = self.options.verified_property.as_deref() else {
            return;
        };
        if target
            .schema
            .get(name)
            .is_some_and(|p| p.kind == PropertyKind::Checkbox)
        {
            properties.insert(name.to_string(), PropertyValue::Checkbox(false));
        }
    }

    /// Mapped Jira field ids touched by changelog entries inside the window.
    fn changed_fields(&self, changelog: &[ChangelogEntry], since: Option<DateTime<Utc>>) -> Vec<String> {
        let mapping = self.mapper.mapping();
        let mut changed = BTreeSet::new();
        for entry in changelog
            .iter()
            .filter(|entry| since.is_none_or(|s| entry.created > s))
        {
            for item in &entry.items {
                changed.extend(mapping.tracked_by(item).into_iter().map(str::to_string));
            }
        }
        changed.into_iter().collect()
    }

    // ── bookkeeping ───────────────────────────────────────────

    /// Record an issue's outcome and update the store.
    ///
    /// Returns `false` when the batch must stop.
    fn conclude(
        &self,
        batch: &mut Batch<'_>,
        issue: &IssueRecord,
        outcome: Result<Applied>,
        bookkeeping: Bookkeeping,
    ) -> bool {
        let project_key = batch.project.key.clone();
        let key = issue.issue_key.as_str();

        match outcome {
            Ok(applied) => {
                match applied {
                    Applied::Created => batch.result.record_created(),
                    Applied::Updated => batch.result.record_updated(),
                    Applied::Skipped => batch.result.record_skipped(),
                }
                let Bookkeeping::Checkpointed(position) = bookkeeping else {
                    return true;
                };
                if batch.retry_keys.remove(key) {
                    if let Err(e) = self.store.settle(&project_key, key) {
                        return self.halt(batch, key, e);
                    }
                }
                if let Err(e) = self.store.advance(&project_key, key, position) {
                    return self.halt(batch, key, e);
                }
                true
            }
            Err(e) => {
                warn!(
                    project = %project_key,
                    issue = key,
                    kind = %e.kind(),
                    error = %e,
                    "Issue sync failed"
                );
                batch.result.record_failed(key, &e);
                if let Bookkeeping::Checkpointed(_) = bookkeeping {
                    if let Err(pe) = self.store.defer(&project_key, key, &e.to_string()) {
                        return self.halt(batch, key, pe);
                    }
                }
                true
            }
        }
    }

    /// Renew the project's lease before touching the next issue.
    ///
    /// Returns `false` when the lease is lost and the batch must stop.
    fn keep_lease(&self, batch: &mut Batch<'_>, lease: &mut FlightPermit<S>, issue: &IssueRecord) -> bool {
        match lease.keep_alive() {
            Ok(()) => true,
            Err(e) => self.halt(batch, &issue.issue_key, e),
        }
    }

    fn halt(&self, batch: &mut Batch<'_>, issue_key: &str, err: Error) -> bool {
        let err = match err.kind() {
            ErrorKind::Persistence => err,
            _ => Error::Persistence(err.to_string()),
        };
        error!(
            project = %batch.project.key,
            issue = issue_key,
            error = %err,
            "Checkpoint store write failed; stopping batch"
        );
        batch.result.errors.push(IssueError::new(issue_key, &err));
        batch.halted = true;
        false
    }
}
