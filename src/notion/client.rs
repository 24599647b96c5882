//! Notion REST client.

use crate::config::NotionSettings;
use crate::error::{Error, Result, Service};
use crate::model::{
    DatabaseSchema, NotionPageRef, PageDraft, PropertyKind, PropertySchema, PropertyValue,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::NotionApi;

const NOTION_API_URL: &str = "https://api.notion.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP implementation of [`NotionApi`] using a bearer integration token.
#[derive(Debug, Clone)]
pub struct HttpNotionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_version: String,
    issue_key_property: String,
}

impl HttpNotionClient {
    /// Build a client from settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the API key is missing.
    pub fn new(settings: &NotionSettings) -> Result<Self> {
        Self::with_base_url(settings, NOTION_API_URL)
    }

    /// Build a client against a different API root (proxies, tests).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` when the API key is missing.
    pub fn with_base_url(settings: &NotionSettings, base_url: &str) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(Error::Config(
                "Missing Notion settings: notion.api_key (NOTION_API_KEY)".into(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
            issue_key_property: settings.issue_key_property.clone(),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.api_version)
            .send()
            .await
            .map_err(|e| Error::transport(Service::Notion, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(Service::Notion, status.as_u16(), error_message(&body)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::transport(Service::Notion, &e))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageObject>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
}

impl NotionApi for HttpNotionClient {
    async fn find_page_by_issue_key(
        &self,
        database_id: &str,
        issue_key: &str,
    ) -> Result<Option<NotionPageRef>> {
        let url = format!("{}/databases/{database_id}/query", self.base_url);
        // The rich_text condition also applies to title properties.
        let body = json!({
            "filter": {
                "property": self.issue_key_property,
                "rich_text": { "equals": issue_key }
            },
            "page_size": 2
        });

        let value = self.send(self.client.post(&url).json(&body)).await?;
        let response: QueryResponse = serde_json::from_value(value)?;

        if response.results.len() > 1 {
            warn!(
                issue = issue_key,
                "Multiple Notion pages carry this issue key; using the first"
            );
        }

        Ok(response.results.into_iter().next().map(|page| NotionPageRef {
            notion_page_id: page.id,
            issue_key: issue_key.to_string(),
        }))
    }

    async fn create_page(&self, database_id: &str, draft: &PageDraft) -> Result<String> {
        let url = format!("{}/pages", self.base_url);
        let mut body = json!({
            "parent": { "database_id": database_id },
            "properties": PageDraft::properties_json(&draft.properties),
        });
        if !draft.children.is_empty() {
            body["children"] = Value::Array(draft.children.iter().map(|b| b.to_notion_json()).collect());
        }

        let value = self.send(self.client.post(&url).json(&body)).await?;
        let page: PageObject = serde_json::from_value(value)?;
        debug!(page_id = %page.id, "Notion page created");
        Ok(page.id)
    }

    async fn update_page(
        &self,
        page_id: &str,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<()> {
        let url = format!("{}/pages/{page_id}", self.base_url);
        let body = json!({ "properties": PageDraft::properties_json(properties) });
        self.send(self.client.patch(&url).json(&body)).await?;
        Ok(())
    }

    async fn get_database_schema(&self, database_id: &str) -> Result<DatabaseSchema> {
        let url = format!("{}/databases/{database_id}", self.base_url);
        let value = self.send(self.client.get(&url)).await?;
        Ok(parse_schema(&value))
    }

    async fn check_connection(&self, database_id: &str) -> Result<()> {
        let url = format!("{}/databases/{database_id}", self.base_url);
        self.send(self.client.get(&url)).await?;
        Ok(())
    }
}

/// Turn a `GET /databases/{id}` response into a [`DatabaseSchema`].
fn parse_schema(database: &Value) -> DatabaseSchema {
    let mut schema = DatabaseSchema::default();
    let Some(properties) = database.get("properties").and_then(Value::as_object) else {
        return schema;
    };

    for (name, property) in properties {
        let type_name = property.get("type").and_then(Value::as_str).unwrap_or_default();
        let kind = PropertyKind::from_notion_type(type_name);

        let options: Vec<String> = property
            .get(type_name)
            .and_then(|config| config.get("options"))
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|o| o.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        schema
            .properties
            .insert(name.clone(), PropertySchema::with_options(kind, options));
    }

    schema
}

/// Notion errors look like `{"object":"error","code":"...","message":"..."}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let message = v.get("message").and_then(Value::as_str)?;
            Some(match v.get("code").and_then(Value::as_str) {
                Some(code) => format!("{code}: {message}"),
                None => message.to_string(),
            })
        })
        .unwrap_or_else(|| body.chars().take(500).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema() {
        let database = json!({
            "object": "database",
            "properties": {
                "Name": { "id": "title", "type": "title", "title": {} },
                "Priority": {
                    "id": "a", "type": "select",
                    "select": { "options": [{ "name": "High" }, { "name": "Low" }] }
                },
                "Total": { "id": "b", "type": "formula", "formula": {} }
            }
        });

        let schema = parse_schema(&database);
        assert_eq!(schema.get("Name").unwrap().kind, PropertyKind::Title);
        assert_eq!(schema.get("Priority").unwrap().options, vec!["High", "Low"]);
        assert_eq!(schema.get("Total").unwrap().kind, PropertyKind::Unsupported);
    }

    #[test]
    fn test_error_message() {
        let body = r#"{"object":"error","status":404,"code":"object_not_found","message":"Could not find page"}"#;
        assert_eq!(error_message(body), "object_not_found: Could not find page");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = HttpNotionClient::new(&NotionSettings::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
