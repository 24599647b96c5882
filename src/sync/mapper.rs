//! Jira field → Notion property mapping.
//!
//! [`FieldMapper::map_fields`] converts raw Jira field values into typed
//! Notion property values according to the live database schema:
//!
//! - properties the database does not have are dropped (debug log only)
//! - values are coerced to the property's declared type
//! - a value that cannot be coerced drops that one property and is
//!   reported as a [`MappingWarning`]; the rest of the page still goes out

use crate::config::FieldMapping;
use crate::error::Error;
use crate::jira::client::parse_jira_datetime;
use crate::model::{DatabaseSchema, PropertyKind, PropertySchema, PropertyValue};
use chrono::SecondsFormat;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A property that was mapped but could not be written as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingWarning {
    pub property: String,
    pub reason: String,
}

impl MappingWarning {
    fn new(property: &str, reason: impl Into<String>) -> Self {
        Self {
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    /// The warning as a `SchemaMismatch` error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::SchemaMismatch {
            property: self.property,
            reason: self.reason,
        }
    }
}

/// Result of mapping one issue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedProperties {
    pub properties: BTreeMap<String, PropertyValue>,
    pub warnings: Vec<MappingWarning>,
}

impl MappedProperties {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Applies a [`FieldMapping`] against database schemas.
#[derive(Debug, Clone)]
pub struct FieldMapper {
    mapping: Arc<FieldMapping>,
}

impl FieldMapper {
    #[must_use]
    pub fn new(mapping: Arc<FieldMapping>) -> Self {
        Self { mapping }
    }

    #[must_use]
    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Map every field of an issue.
    #[must_use]
    pub fn map_fields(
        &self,
        issue_fields: &BTreeMap<String, Value>,
        target_schema: &DatabaseSchema,
    ) -> MappedProperties {
        self.map_where(issue_fields, target_schema, |_| true)
    }

    /// Map only the given Jira field ids (the ones a changelog says changed).
    #[must_use]
    pub fn map_selected(
        &self,
        issue_fields: &BTreeMap<String, Value>,
        target_schema: &DatabaseSchema,
        jira_fields: &[&str],
    ) -> MappedProperties {
        self.map_where(issue_fields, target_schema, |id| jira_fields.contains(&id))
    }

    /// Coerce the configured page defaults against a schema.
    #[must_use]
    pub fn map_defaults(&self, target_schema: &DatabaseSchema) -> MappedProperties {
        let mut mapped = MappedProperties::default();
        for (property, raw) in self.mapping.page_defaults() {
            self.map_one(property, raw, target_schema, &mut mapped);
        }
        mapped
    }

    fn map_where<F>(
        &self,
        issue_fields: &BTreeMap<String, Value>,
        target_schema: &DatabaseSchema,
        include: F,
    ) -> MappedProperties
    where
        F: Fn(&str) -> bool,
    {
        let mut mapped = MappedProperties::default();

        for (jira_field, property) in self.mapping.iter() {
            if !include(jira_field) {
                continue;
            }
            // Fields Jira did not return are left alone, unlike explicit nulls
            let Some(raw) = issue_fields.get(jira_field) else {
                continue;
            };
            self.map_one(property, raw, target_schema, &mut mapped);
        }

        mapped
    }

    fn map_one(
        &self,
        property: &str,
        raw: &Value,
        target_schema: &DatabaseSchema,
        mapped: &mut MappedProperties,
    ) {
        let Some(schema) = target_schema.get(property) else {
            debug!(property, "Property not in target database, dropping");
            return;
        };

        match coerce(raw, schema, &self.mapping) {
            Ok(Coerced { value, dropped }) => {
                for reason in dropped {
                    mapped.warnings.push(MappingWarning::new(property, reason));
                }
                mapped.properties.insert(property.to_string(), value);
            }
            Err(reason) => {
                debug!(property, %reason, "Dropping property that failed coercion");
                mapped.warnings.push(MappingWarning::new(property, reason));
            }
        }
    }
}

struct Coerced {
    value: PropertyValue,
    /// Partial losses (e.g. multi-select options the database lacks).
    dropped: Vec<String>,
}

impl From<PropertyValue> for Coerced {
    fn from(value: PropertyValue) -> Self {
        Self {
            value,
            dropped: Vec::new(),
        }
    }
}

fn coerce(
    raw: &Value,
    schema: &PropertySchema,
    mapping: &FieldMapping,
) -> std::result::Result<Coerced, String> {
    if raw.is_null() && schema.kind != PropertyKind::Unsupported {
        return Ok(PropertyValue::Empty(schema.kind).into());
    }

    let value = match schema.kind {
        PropertyKind::Title => PropertyValue::Title(require_text(raw)?),
        PropertyKind::RichText => PropertyValue::RichText(require_text(raw)?),
        PropertyKind::Select => PropertyValue::Select(resolve_option(raw, schema)?),
        PropertyKind::Status => PropertyValue::Status(resolve_option(raw, schema)?),
        PropertyKind::MultiSelect => return Ok(coerce_multi_select(raw, schema)),
        PropertyKind::Date => PropertyValue::Date(coerce_date(raw)?),
        PropertyKind::Number => PropertyValue::Number(coerce_number(raw)?),
        PropertyKind::People => PropertyValue::People(coerce_people(raw, mapping)?),
        PropertyKind::Checkbox => PropertyValue::Checkbox(coerce_checkbox(raw)?),
        PropertyKind::Url => PropertyValue::Url(require_text(raw)?),
        PropertyKind::Unsupported => return Err("property type cannot be written".into()),
    };
    Ok(value.into())
}

fn require_text(raw: &Value) -> std::result::Result<String, String> {
    to_text(raw).ok_or_else(|| format!("cannot render {} as text", type_name(raw)))
}

fn resolve_option(raw: &Value, schema: &PropertySchema) -> std::result::Result<String, String> {
    let name = require_text(raw)?;
    schema
        .resolve_option(&name)
        .ok_or_else(|| format!("'{name}' is not one of the database options"))
}

fn coerce_multi_select(raw: &Value, schema: &PropertySchema) -> Coerced {
    let names: Vec<String> = match raw {
        Value::Array(items) => items.iter().filter_map(to_text).collect(),
        other => to_text(other)
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    };

    let mut resolved = Vec::new();
    let mut dropped = Vec::new();
    for name in names {
        match schema.resolve_option(&name) {
            Some(option) if !resolved.contains(&option) => resolved.push(option),
            Some(_) => {}
            None => dropped.push(format!("option '{name}' is not in the database, dropped")),
        }
    }

    Coerced {
        value: PropertyValue::MultiSelect(resolved),
        dropped,
    }
}

fn coerce_date(raw: &Value) -> std::result::Result<String, String> {
    let text = require_text(raw)?;
    let trimmed = text.trim();

    // Date-only values stay date-only so Notion does not invent a time
    if trimmed.len() == 10 && chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
        return Ok(trimmed.to_string());
    }

    parse_jira_datetime(trimmed)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .ok_or_else(|| format!("'{trimmed}' is not a date"))
}

fn coerce_number(raw: &Value) -> std::result::Result<f64, String> {
    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("{n} is out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("'{s}' is not a number")),
        Value::Object(obj) => obj
            .get("value")
            .map_or_else(|| Err("object has no numeric value".into()), coerce_number),
        other => Err(format!("cannot use {} as a number", type_name(other))),
    }
}

fn coerce_people(raw: &Value, mapping: &FieldMapping) -> std::result::Result<Vec<String>, String> {
    let users: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut ids = Vec::new();
    let mut unresolved = Vec::new();
    for user in users {
        let identities: Vec<&str> = match user {
            Value::String(s) => vec![s.as_str()],
            Value::Object(obj) => ["accountId", "emailAddress", "displayName"]
                .iter()
                .filter_map(|k| obj.get(*k).and_then(Value::as_str))
                .collect(),
            _ => Vec::new(),
        };

        match identities.iter().find_map(|id| mapping.notion_user(id)) {
            Some(id) => ids.push(id.to_string()),
            None => unresolved.push(identities.first().copied().unwrap_or("?").to_string()),
        }
    }

    if ids.is_empty() {
        return Err(format!(
            "no Notion user configured for {}",
            unresolved.join(", ")
        ));
    }
    Ok(ids)
}

fn coerce_checkbox(raw: &Value) -> std::result::Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            _ => Err(format!("'{s}' is not a boolean")),
        },
        other => Err(format!("cannot use {} as a checkbox", type_name(other))),
    }
}

/// Render a Jira field value as plain text.
///
/// Handles strings, scalars, named objects (`status`, `priority`, users,
/// options), arrays (comma-joined) and Atlassian Document Format bodies.
#[must_use]
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(to_text).collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        Value::Object(obj) => {
            if obj.get("type").and_then(Value::as_str) == Some("doc") {
                return Some(adf_to_text(value));
            }
            ["name", "displayName", "value", "key"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_str))
                .map(String::from)
        }
    }
}

/// Flatten an Atlassian Document Format tree into plain text.
///
/// Paragraphs and headings end with a newline; list items are prefixed
/// with `* ` (bullets) or `1. ` (ordered).
#[must_use]
pub fn adf_to_text(doc: &Value) -> String {
    let mut out = String::new();
    write_adf(doc, &mut out, None);
    out.trim().to_string()
}

fn write_adf(node: &Value, out: &mut String, list_marker: Option<&str>) {
    let node_type = node.get("type").and_then(Value::as_str).unwrap_or_default();
    let children = node.get("content").and_then(Value::as_array);
    let attr = |name: &str| {
        node.get("attrs")
            .and_then(|a| a.get(name))
            .and_then(Value::as_str)
    };

    match node_type {
        "text" => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        "hardBreak" => out.push('\n'),
        "mention" => out.push_str(attr("text").unwrap_or_default()),
        "emoji" => out.push_str(attr("text").or_else(|| attr("shortName")).unwrap_or_default()),
        "inlineCard" | "blockCard" => out.push_str(attr("url").unwrap_or_default()),
        "bulletList" | "orderedList" => {
            let marker = if node_type == "bulletList" { "* " } else { "1. " };
            for child in children.into_iter().flatten() {
                write_adf(child, out, Some(marker));
            }
        }
        "listItem" => {
            out.push_str(list_marker.unwrap_or("* "));
            for child in children.into_iter().flatten() {
                write_adf(child, out, None);
            }
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        "paragraph" | "heading" | "codeBlock" | "blockquote" => {
            for child in children.into_iter().flatten() {
                write_adf(child, out, None);
            }
            if !out.ends_with('\n') {
                out.push('\n');
            }
        }
        _ => {
            for child in children.into_iter().flatten() {
                write_adf(child, out, list_marker);
            }
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapper() -> FieldMapper {
        let mut people = BTreeMap::new();
        people.insert("acc-1".to_string(), "notion-user-1".to_string());
        FieldMapper::new(Arc::new(
            FieldMapping::new(FieldMapping::default_fields()).with_people(people),
        ))
    }

    fn schema() -> DatabaseSchema {
        DatabaseSchema::default()
            .with("Name", PropertySchema::new(PropertyKind::Title))
            .with(
                "Status",
                PropertySchema::with_options(PropertyKind::Status, ["To Do", "In Progress", "Done"]),
            )
            .with(
                "Priority",
                PropertySchema::with_options(PropertyKind::Select, ["High", "Medium", "Low"]),
            )
            .with("Assignee", PropertySchema::new(PropertyKind::People))
            .with("Created", PropertySchema::new(PropertyKind::Date))
            .with(
                "Tags",
                PropertySchema::with_options(PropertyKind::MultiSelect, ["backend", "ui"]),
            )
            .with("Description", PropertySchema::new(PropertyKind::RichText))
    }

    fn fields(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_map_fields_coerces_by_type() {
        let issue = fields(json!({
            "summary": "Login broken",
            "status": {"name": "in progress"},
            "priority": {"name": "High"},
            "assignee": {"accountId": "acc-1", "displayName": "Ana"},
            "created": "2024-03-01T10:00:00.000+0000",
            "labels": ["backend", "ui"]
        }));

        let mapped = mapper().map_fields(&issue, &schema());
        assert!(mapped.warnings.is_empty(), "{:?}", mapped.warnings);
        assert_eq!(mapped.properties["Name"], PropertyValue::Title("Login broken".into()));
        assert_eq!(mapped.properties["Status"], PropertyValue::Status("In Progress".into()));
        assert_eq!(mapped.properties["Priority"], PropertyValue::Select("High".into()));
        assert_eq!(
            mapped.properties["Assignee"],
            PropertyValue::People(vec!["notion-user-1".into()])
        );
        assert_eq!(
            mapped.properties["Created"],
            PropertyValue::Date("2024-03-01T10:00:00Z".into())
        );
        assert_eq!(
            mapped.properties["Tags"],
            PropertyValue::MultiSelect(vec!["backend".into(), "ui".into()])
        );
    }

    #[test]
    fn test_absent_property_is_dropped_without_error() {
        let schema = DatabaseSchema::default().with("Name", PropertySchema::new(PropertyKind::Title));
        let issue = fields(json!({"summary": "x", "priority": {"name": "High"}}));

        let mapped = mapper().map_fields(&issue, &schema);
        assert!(!mapped.properties.contains_key("Priority"));
        assert!(mapped.warnings.is_empty());
        assert_eq!(mapped.properties.len(), 1);
    }

    #[test]
    fn test_unknown_select_option_is_a_warning() {
        let issue = fields(json!({"summary": "x", "priority": {"name": "Blocker"}}));

        let mapped = mapper().map_fields(&issue, &schema());
        assert!(!mapped.properties.contains_key("Priority"));
        assert!(mapped.properties.contains_key("Name"));
        assert_eq!(mapped.warnings.len(), 1);
        assert_eq!(mapped.warnings[0].property, "Priority");
        assert!(matches!(
            mapped.warnings[0].clone().into_error(),
            Error::SchemaMismatch { .. }
        ));
    }

    #[test]
    fn test_multi_select_keeps_known_options() {
        let issue = fields(json!({"labels": ["backend", "infra"]}));
        let mapped = mapper().map_fields(&issue, &schema());
        assert_eq!(
            mapped.properties["Tags"],
            PropertyValue::MultiSelect(vec!["backend".into()])
        );
        assert_eq!(mapped.warnings.len(), 1);
    }

    #[test]
    fn test_null_clears_and_missing_is_skipped() {
        let issue = fields(json!({"priority": null}));
        let mapped = mapper().map_fields(&issue, &schema());
        assert_eq!(
            mapped.properties["Priority"],
            PropertyValue::Empty(PropertyKind::Select)
        );
        assert!(!mapped.properties.contains_key("Name"));
    }

    #[test]
    fn test_unmapped_person_is_a_warning() {
        let issue = fields(json!({"assignee": {"accountId": "acc-9", "displayName": "Bob"}}));
        let mapped = mapper().map_fields(&issue, &schema());
        assert!(mapped.properties.is_empty());
        assert!(mapped.warnings[0].reason.contains("acc-9"));
    }

    #[test]
    fn test_map_selected_only_touches_listed_fields() {
        let issue = fields(json!({
            "summary": "Login broken",
            "status": {"name": "Done"},
            "priority": {"name": "Low"}
        }));
        let mapped = mapper().map_selected(&issue, &schema(), &["status"]);
        assert_eq!(mapped.properties.len(), 1);
        assert_eq!(mapped.properties["Status"], PropertyValue::Status("Done".into()));
    }

    #[test]
    fn test_map_defaults() {
        let mut defaults = BTreeMap::new();
        defaults.insert("Tags".to_string(), json!(["ui"]));
        defaults.insert("Verified".to_string(), json!(false));
        let mapper = FieldMapper::new(Arc::new(FieldMapping::default().with_page_defaults(defaults)));

        let mapped = mapper.map_defaults(&schema());
        assert_eq!(mapped.properties.len(), 1);
        assert_eq!(mapped.properties["Tags"], PropertyValue::MultiSelect(vec!["ui".into()]));
    }

    #[test]
    fn test_adf_description_is_flattened() {
        let doc = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Steps:"},
                    {"type": "hardBreak"},
                    {"type": "text", "text": "open the app"}
                ]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "first"}]}
                    ]},
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "second"}]}
                    ]}
                ]}
            ]
        });

        assert_eq!(
            to_text(&doc).unwrap(),
            "Steps:\nopen the app\n* first\n* second"
        );
    }

    #[test]
    fn test_scalar_coercions() {
        let number = PropertySchema::new(PropertyKind::Number);
        let checkbox = PropertySchema::new(PropertyKind::Checkbox);
        let mapping = FieldMapping::default();

        assert_eq!(
            coerce(&json!("3.5"), &number, &mapping).unwrap().value,
            PropertyValue::Number(3.5)
        );
        assert!(coerce(&json!("lots"), &number, &mapping).is_err());
        assert_eq!(
            coerce(&json!("yes"), &checkbox, &mapping).unwrap().value,
            PropertyValue::Checkbox(true)
        );
        assert_eq!(
            coerce(&json!("2024-05-01"), &PropertySchema::new(PropertyKind::Date), &mapping)
                .unwrap()
                .value,
            PropertyValue::Date("2024-05-01".into())
        );
    }
}
