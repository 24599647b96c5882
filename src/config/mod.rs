//! Configuration management.
//!
//! Settings come from a JSON file with environment overrides on top:
//!
//! - **Config file**: `--config`, then `J2N_CONFIG`, then `~/.jira2notion/config.json`
//! - **Database**: `--db`, then `J2N_DB`, then `~/.jira2notion/data/checkpoints.db`
//!
//! Credentials are usually supplied through the environment (`JIRA_EMAIL`,
//! `JIRA_API_TOKEN`, `NOTION_API_KEY`, ...) so the file can be shared.

mod field_map;

pub use field_map::FieldMapping;

use crate::error::{Error, Result};
use crate::model::ProjectConfig;
use crate::validate::{normalize_database_id, normalize_project_key};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Default seconds between scheduled cycles.
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 10;

/// Default window, in minutes, for a project with no checkpoint yet.
pub const DEFAULT_LOOKBACK_MINUTES: i64 = 1440;

/// Notion API version sent on every request.
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// Property holding the Jira issue key on every mirrored page.
pub const DEFAULT_ISSUE_KEY_PROPERTY: &str = "Jira Issue Key";

/// Jira field rendered as the body of created pages.
pub const DEFAULT_BODY_FIELD: &str = "description";

/// Jira connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraSettings {
    /// Site URL, e.g. `https://acme.atlassian.net`.
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    /// IANA zone used to render JQL dates. Should match the Jira user's profile zone.
    pub timezone: Option<String>,
    /// Default assignee for `sync-user` when neither the command nor the project names one.
    pub assignee: Option<String>,
}

/// Notion connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotionSettings {
    pub api_key: String,
    pub default_database_id: Option<String>,
    pub issue_key_property: String,
    /// Checkbox reset to unchecked whenever a user sync touches a page.
    pub verified_property: Option<String>,
    /// Jira field written as paragraphs into the body of created pages.
    pub body_field: Option<String>,
    pub api_version: String,
}

impl Default for NotionSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_database_id: None,
            issue_key_property: DEFAULT_ISSUE_KEY_PROPERTY.to_string(),
            verified_property: None,
            body_field: Some(DEFAULT_BODY_FIELD.to_string()),
            api_version: DEFAULT_NOTION_VERSION.to_string(),
        }
    }
}

/// Full configuration, as loaded from disk and environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub jira: JiraSettings,
    pub notion: NotionSettings,
    pub projects: Vec<ProjectConfig>,
    /// Jira field id → Notion property name.
    pub field_map: BTreeMap<String, String>,
    /// Notion property name → raw value set on every created page.
    pub page_defaults: BTreeMap<String, Value>,
    /// Jira account id or email → Notion user id.
    pub people: BTreeMap<String, String>,
    pub check_interval_secs: u64,
    /// 0 means no lower bound on the first cycle.
    pub lookback_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jira: JiraSettings::default(),
            notion: NotionSettings::default(),
            projects: Vec::new(),
            field_map: FieldMapping::default_fields(),
            page_defaults: BTreeMap::new(),
            people: BTreeMap::new(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
            lookback_minutes: DEFAULT_LOOKBACK_MINUTES,
        }
    }
}

impl Settings {
    /// Parse settings from JSON text (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is not valid settings JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
    }

    /// Apply environment overrides through a lookup function.
    ///
    /// Blank values are ignored. `JIRA_PROJECT_KEY` only takes effect when
    /// the file configures no projects.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("JIRA_URL").or_else(|| get("JIRA_DOMAIN")) {
            self.jira.base_url = url;
        }
        if let Some(email) = get("JIRA_EMAIL") {
            self.jira.email = email;
        }
        if let Some(token) = get("JIRA_API_TOKEN") {
            self.jira.api_token = token;
        }
        if let Some(tz) = get("JIRA_TIMEZONE") {
            self.jira.timezone = Some(tz);
        }
        if let Some(key) = get("NOTION_API_KEY") {
            self.notion.api_key = key;
        }
        if let Some(db) = get("NOTION_DATABASE_ID") {
            self.notion.default_database_id = Some(db);
        }
        if self.projects.is_empty() {
            if let Some(key) = get("JIRA_PROJECT_KEY") {
                self.projects.push(ProjectConfig::new(key));
            }
        }
        if let Some(secs) = get("J2N_CHECK_INTERVAL").and_then(|v| v.trim().parse().ok()) {
            self.check_interval_secs = secs;
        }

        self.jira.base_url = normalize_base_url(&self.jira.base_url);
    }

    /// Check structural invariants and canonicalize identifiers.
    ///
    /// Credentials are not checked here; the API clients reject missing
    /// credentials when they are built.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on duplicate or malformed project keys,
    /// malformed database ids, an unknown timezone, or a zero interval.
    pub fn validate(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for project in &mut self.projects {
            project.key = normalize_project_key(&project.key).map_err(|(input, hint)| {
                Error::Config(with_hint(format!("Invalid project key '{input}'"), hint))
            })?;
            if !seen.insert(project.key.clone()) {
                return Err(Error::Config(format!(
                    "Duplicate project key '{}' in configuration",
                    project.key
                )));
            }
            if let Some(db) = project.notion_database_id.as_deref().filter(|d| !d.trim().is_empty()) {
                project.notion_database_id = Some(canonical_database_id(db)?);
            }
        }

        if let Some(db) = self
            .notion
            .default_database_id
            .as_deref()
            .filter(|d| !d.trim().is_empty())
        {
            self.notion.default_database_id = Some(canonical_database_id(db)?);
        }

        if self.check_interval_secs == 0 {
            return Err(Error::Config("check_interval_secs must be at least 1".into()));
        }
        if self.lookback_minutes < 0 {
            return Err(Error::Config("lookback_minutes cannot be negative".into()));
        }
        if self.notion.issue_key_property.trim().is_empty() {
            return Err(Error::Config("notion.issue_key_property cannot be empty".into()));
        }

        self.timezone()?;
        Ok(())
    }

    /// Timezone for JQL date literals (UTC when unset).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a name chrono-tz does not know.
    pub fn timezone(&self) -> Result<Tz> {
        match self.jira.timezone.as_deref().map(str::trim) {
            None | Some("") => Ok(Tz::UTC),
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| Error::Config(format!("Unknown timezone '{name}'"))),
        }
    }

    /// Build the shared, immutable field mapping.
    #[must_use]
    pub fn field_mapping(&self) -> Arc<FieldMapping> {
        Arc::new(
            FieldMapping::new(self.field_map.clone())
                .with_page_defaults(self.page_defaults.clone())
                .with_people(self.people.clone()),
        )
    }

    /// Look up a configured project by key (case-insensitive).
    #[must_use]
    pub fn project(&self, key: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.key.eq_ignore_ascii_case(key))
    }

    #[must_use]
    pub fn project_keys(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.key.clone()).collect()
    }
}

fn canonical_database_id(raw: &str) -> Result<String> {
    normalize_database_id(raw).map_err(|(input, hint)| {
        Error::Config(with_hint(format!("Invalid Notion database id '{input}'"), hint))
    })
}

fn with_hint(message: String, hint: Option<String>) -> String {
    match hint {
        Some(hint) => format!("{message} ({hint})"),
        None => message,
    }
}

/// Accept `acme.atlassian.net` as well as a full URL; strip trailing slashes.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Get the global jira2notion directory (`~/.jira2notion`).
#[must_use]
pub fn global_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".jira2notion"))
}

/// Resolve the config file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `J2N_CONFIG` environment variable
/// 3. `~/.jira2notion/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var("J2N_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    global_dir().map(|dir| dir.join("config.json"))
}

/// Resolve the checkpoint database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `J2N_DB` environment variable
/// 3. `~/.jira2notion/data/checkpoints.db`
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("J2N_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_dir().map(|dir| dir.join("data").join("checkpoints.db"))
}

/// Load settings: file (if present), then environment, then validation.
///
/// A missing file is not an error when the path was not given explicitly;
/// everything can come from the environment.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or parsed, or if the
/// resulting settings are invalid.
pub fn load_settings(explicit_path: Option<&Path>) -> Result<Settings> {
    let path = resolve_config_path(explicit_path);

    let mut settings = match &path {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading config");
            let content = fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;
            Settings::from_json(&content)?
        }
        Some(path) if explicit_path.is_some() => {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        _ => Settings::default(),
    };

    settings.apply_env(|name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.check_interval_secs, 10);
        assert_eq!(settings.lookback_minutes, 1440);
        assert_eq!(settings.notion.issue_key_property, "Jira Issue Key");
        assert_eq!(settings.notion.api_version, "2022-06-28");
        assert_eq!(settings.notion.body_field.as_deref(), Some("description"));
        assert!(settings.field_map.contains_key("summary"));
    }

    #[test]
    fn test_body_field_can_be_disabled() {
        let settings = Settings::from_json(r#"{"notion":{"body_field":null}}"#).unwrap();
        assert_eq!(settings.notion.body_field, None);
        assert_eq!(settings.notion.issue_key_property, "Jira Issue Key");
    }

    #[test]
    fn test_from_json_partial_file_keeps_defaults() {
        let settings = Settings::from_json(
            r#"{"projects":[{"key":"ops","jql":"type = Bug"}],"lookback_minutes":0}"#,
        )
        .unwrap();
        assert_eq!(settings.projects.len(), 1);
        assert_eq!(settings.lookback_minutes, 0);
        assert_eq!(settings.check_interval_secs, 10);
        assert!(!settings.field_map.is_empty());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::from_json(
            r#"{"jira":{"base_url":"https://old.atlassian.net","email":"a@b.c"}}"#,
        )
        .unwrap();
        settings.apply_env(env(&[
            ("JIRA_DOMAIN", "acme.atlassian.net/"),
            ("JIRA_API_TOKEN", "tok"),
            ("JIRA_EMAIL", "  "),
            ("JIRA_PROJECT_KEY", "PROJ"),
            ("J2N_CHECK_INTERVAL", "30"),
        ]));

        assert_eq!(settings.jira.base_url, "https://acme.atlassian.net");
        assert_eq!(settings.jira.email, "a@b.c");
        assert_eq!(settings.jira.api_token, "tok");
        assert_eq!(settings.projects, vec![ProjectConfig::new("PROJ")]);
        assert_eq!(settings.check_interval_secs, 30);
    }

    #[test]
    fn test_env_project_key_does_not_replace_configured_projects() {
        let mut settings = Settings::from_json(r#"{"projects":[{"key":"OPS"}]}"#).unwrap();
        settings.apply_env(env(&[("JIRA_PROJECT_KEY", "PROJ")]));
        assert_eq!(settings.project_keys(), vec!["OPS".to_string()]);
    }

    #[test]
    fn test_validate_rejects_duplicate_keys() {
        let mut settings =
            Settings::from_json(r#"{"projects":[{"key":"PROJ"},{"key":"proj"}]}"#).unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("Duplicate")));
    }

    #[test]
    fn test_validate_canonicalizes_ids() {
        let mut settings = Settings::from_json(
            r#"{"projects":[{"key":"ops","database_id":"0123456789abcdef0123456789abcdef"}]}"#,
        )
        .unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.projects[0].key, "OPS");
        assert_eq!(
            settings.projects[0].notion_database_id.as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
    }

    #[test]
    fn test_validate_rejects_bad_timezone_and_interval() {
        let mut settings = Settings::default();
        settings.jira.timezone = Some("Mars/Olympus".into());
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.check_interval_secs = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_timezone_parsing() {
        let mut settings = Settings::default();
        assert_eq!(settings.timezone().unwrap(), Tz::UTC);
        settings.jira.timezone = Some("America/Bogota".into());
        assert_eq!(settings.timezone().unwrap(), chrono_tz::America::Bogota);
    }

    #[test]
    fn test_load_settings_missing_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("nope.json");
        assert!(matches!(load_settings(Some(&missing)), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_settings_from_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, r#"{"projects":[{"key":"ops"}],"check_interval_secs":5}"#).unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert!(settings.project("OPS").is_some());
        assert_eq!(settings.check_interval_secs, 5);
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/db.sqlite");
        assert_eq!(resolve_db_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_resolve_db_path_default_location() {
        if std::env::var("J2N_DB").is_ok() {
            return;
        }
        let path = resolve_db_path(None).unwrap();
        assert!(path.ends_with("checkpoints.db"));
    }
}
