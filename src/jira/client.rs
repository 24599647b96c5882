//! Jira Cloud REST v3 client.
//!
//! Search uses `POST /rest/api/3/search/jql`, which pages with an opaque
//! `nextPageToken`. Changelogs page with `startAt` / `isLast`.

use crate::config::JiraSettings;
use crate::error::{Error, Result, Service};
use crate::model::{Assignee, ChangeItem, ChangelogEntry, IssueRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::JiraApi;

const SEARCH_PAGE_SIZE: u32 = 100;
const CHANGELOG_PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`JiraApi`] using basic auth (email + API token).
#[derive(Debug, Clone)]
pub struct HttpJiraClient {
    client: reqwest::Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl HttpJiraClient {
    /// Build a client from settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the URL or credentials are missing.
    pub fn new(settings: &JiraSettings) -> Result<Self> {
        let missing: Vec<&str> = [
            ("jira.base_url (JIRA_DOMAIN)", settings.base_url.as_str()),
            ("jira.email (JIRA_EMAIL)", settings.email.as_str()),
            ("jira.api_token (JIRA_API_TOKEN)", settings.api_token.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing Jira settings: {}",
                missing.join(", ")
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            email: settings.email.clone(),
            api_token: settings.api_token.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| Error::transport(Service::Jira, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::api(Service::Jira, status.as_u16(), error_message(&body)))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    jql: &'a str,
    fields: &'a [String],
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    issues: Vec<RawIssue>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    key: String,
    #[serde(default)]
    fields: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangelogPage {
    #[serde(default)]
    values: Vec<RawHistory>,
    #[serde(default)]
    is_last: Option<bool>,
    #[serde(default)]
    total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    created: String,
    #[serde(default)]
    items: Vec<RawChangeItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangeItem {
    field: String,
    field_id: Option<String>,
    from_string: Option<String>,
    to_string: Option<String>,
}

impl JiraApi for HttpJiraClient {
    async fn search_issues(&self, jql: &str, fields: &[String]) -> Result<Vec<IssueRecord>> {
        let url = format!("{}/rest/api/3/search/jql", self.base_url);
        let mut issues = Vec::new();
        let mut next_page_token: Option<String> = None;

        loop {
            let body = SearchRequest {
                jql,
                fields,
                max_results: SEARCH_PAGE_SIZE,
                next_page_token: next_page_token.as_deref(),
            };

            let response = self.send(self.client.post(&url).json(&body)).await?;
            let page: SearchResponse = response
                .json()
                .await
                .map_err(|e| Error::transport(Service::Jira, &e))?;

            trace!(count = page.issues.len(), "Jira search page");
            collect_records(page.issues, &mut issues);

            match page.next_page_token {
                Some(token) if !token.is_empty() && next_page_token.as_deref() != Some(token.as_str()) => {
                    next_page_token = Some(token);
                }
                _ => break,
            }
        }

        debug!(jql, count = issues.len(), "Jira search complete");
        Ok(issues)
    }

    async fn get_changelog(&self, issue_key: &str) -> Result<Vec<ChangelogEntry>> {
        let url = format!("{}/rest/api/3/issue/{issue_key}/changelog", self.base_url);
        let mut entries = Vec::new();
        let mut start_at: u32 = 0;

        loop {
            let request = self.client.get(&url).query(&[
                ("startAt", start_at.to_string()),
                ("maxResults", CHANGELOG_PAGE_SIZE.to_string()),
            ]);
            let page: ChangelogPage = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|e| Error::transport(Service::Jira, &e))?;

            let fetched = u32::try_from(page.values.len()).unwrap_or(u32::MAX);
            for history in page.values {
                let Some(created) = parse_jira_datetime(&history.created) else {
                    warn!(issue = issue_key, created = %history.created, "Skipping changelog entry with unparseable date");
                    continue;
                };
                entries.push(ChangelogEntry {
                    created,
                    items: history
                        .items
                        .into_iter()
                        .map(|item| ChangeItem {
                            field: item.field,
                            field_id: item.field_id,
                            from: item.from_string,
                            to: item.to_string,
                        })
                        .collect(),
                });
            }

            start_at = start_at.saturating_add(fetched);
            let exhausted = match (page.is_last, page.total) {
                (Some(is_last), _) => is_last,
                (None, Some(total)) => start_at >= total,
                (None, None) => true,
            };
            if exhausted || fetched == 0 {
                break;
            }
        }

        entries.sort_by_key(|e| e.created);
        Ok(entries)
    }

    async fn check_connection(&self) -> Result<()> {
        let url = format!("{}/rest/api/3/myself", self.base_url);
        self.send(self.client.get(&url)).await?;
        Ok(())
    }
}

/// Convert a page of search hits, skipping hits that cannot be parsed.
///
/// A malformed hit only costs that issue; the rest of the page is kept.
fn collect_records(raws: Vec<RawIssue>, issues: &mut Vec<IssueRecord>) {
    for raw in raws {
        let key = raw.key.clone();
        match into_record(raw) {
            Ok(record) => issues.push(record),
            Err(e) => warn!(issue = %key, error = %e, "Skipping unparseable search hit"),
        }
    }
}

/// Convert a raw search hit into an [`IssueRecord`].
fn into_record(raw: RawIssue) -> Result<IssueRecord> {
    let timestamp = |name: &str| -> Result<DateTime<Utc>> {
        raw.fields
            .get(name)
            .and_then(Value::as_str)
            .and_then(parse_jira_datetime)
            .ok_or_else(|| Error::Api {
                service: Service::Jira,
                status: None,
                message: format!("issue {} has no parseable '{name}' field", raw.key),
            })
    };

    let created = timestamp("created")?;
    let updated = timestamp("updated").unwrap_or(created);

    let assignee = raw
        .fields
        .get("assignee")
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value::<Assignee>(v.clone()).ok());

    let fields: BTreeMap<String, Value> = raw.fields.into_iter().collect();

    Ok(IssueRecord {
        issue_key: raw.key,
        fields,
        created,
        updated,
        changelog: Vec::new(),
        assignee,
    })
}

/// Parse the timestamp formats Jira emits.
///
/// Jira uses `2024-03-01T10:15:30.123+0000` (no colon in the offset), but
/// RFC 3339 and bare dates also show up in custom fields.
#[must_use]
pub fn parse_jira_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

/// Pull a readable message out of a Jira error body.
///
/// Jira answers `{"errorMessages": [...], "errors": {"field": "msg"}}`.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.chars().take(500).collect();
    };

    let mut messages: Vec<String> = value
        .get("errorMessages")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();

    if let Some(errors) = value.get("errors").and_then(Value::as_object) {
        messages.extend(
            errors
                .iter()
                .filter_map(|(field, msg)| msg.as_str().map(|m| format!("{field}: {m}"))),
        );
    }

    if messages.is_empty() {
        body.chars().take(500).collect()
    } else {
        messages.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_parse_jira_datetime_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 15, 15, 30).unwrap();
        assert_eq!(
            parse_jira_datetime("2024-03-01T10:15:30.000-0500"),
            Some(expected)
        );
        assert_eq!(parse_jira_datetime("2024-03-01T15:15:30Z"), Some(expected));
        assert_eq!(
            parse_jira_datetime("2024-03-01"),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_jira_datetime("yesterday"), None);
    }

    #[test]
    fn test_into_record_extracts_timestamps_and_assignee() {
        let raw: RawIssue = serde_json::from_value(json!({
            "key": "PROJ-7",
            "fields": {
                "summary": "Login broken",
                "created": "2024-03-01T10:00:00.000+0000",
                "updated": "2024-03-02T10:00:00.000+0000",
                "assignee": {"accountId": "abc", "displayName": "Ana", "emailAddress": "ana@example.com"}
            }
        }))
        .unwrap();

        let record = into_record(raw).unwrap();
        assert_eq!(record.issue_key, "PROJ-7");
        assert_eq!(record.summary(), Some("Login broken"));
        assert!(record.updated > record.created);
        assert_eq!(
            record.assignee.unwrap().email_address.as_deref(),
            Some("ana@example.com")
        );
    }

    #[test]
    fn test_into_record_requires_created() {
        let raw: RawIssue =
            serde_json::from_value(json!({"key": "PROJ-1", "fields": {"summary": "x"}})).unwrap();
        assert!(into_record(raw).is_err());
    }

    #[test]
    fn test_malformed_hit_is_skipped_not_fatal() {
        let page: SearchResponse = serde_json::from_value(json!({
            "issues": [
                {"key": "PROJ-1", "fields": {"created": "2024-03-01T10:00:00.000+0000"}},
                {"key": "PROJ-2", "fields": {"created": "last tuesday"}},
                {"key": "PROJ-3", "fields": {"created": "2024-03-01T11:00:00.000+0000"}}
            ]
        }))
        .unwrap();

        let mut issues = Vec::new();
        collect_records(page.issues, &mut issues);
        let keys: Vec<&str> = issues.iter().map(|i| i.issue_key.as_str()).collect();
        assert_eq!(keys, ["PROJ-1", "PROJ-3"]);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"errorMessages":["Field 'foo' does not exist"],"errors":{"jql":"bad"}}"#;
        assert_eq!(error_message(body), "Field 'foo' does not exist; jql: bad");
        assert_eq!(error_message("plain text"), "plain text");
    }

    #[test]
    fn test_new_requires_credentials() {
        let settings = JiraSettings {
            base_url: "https://acme.atlassian.net".into(),
            ..JiraSettings::default()
        };
        let err = HttpJiraClient::new(&settings).unwrap_err();
        assert!(err.to_string().contains("JIRA_API_TOKEN"));
    }
}
