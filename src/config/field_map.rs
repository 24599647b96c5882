//! The Jira field → Notion property mapping table.

use crate::model::ChangeItem;
use serde_json::Value;
use std::collections::BTreeMap;

/// Static mapping from Jira field ids to Notion property names.
///
/// Built once from settings and shared as `Arc<FieldMapping>`; nothing
/// mutates it after load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMapping {
    fields: BTreeMap<String, String>,
    page_defaults: BTreeMap<String, Value>,
    people: BTreeMap<String, String>,
}

impl FieldMapping {
    #[must_use]
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Raw values written to every newly created page, keyed by property name.
    #[must_use]
    pub fn with_page_defaults(mut self, defaults: BTreeMap<String, Value>) -> Self {
        self.page_defaults = defaults;
        self
    }

    /// Jira account id / email → Notion user id, used for `people` properties.
    #[must_use]
    pub fn with_people(mut self, people: BTreeMap<String, String>) -> Self {
        self.people = people;
        self
    }

    /// The mapping the tool ships with when the config has no `field_map`.
    #[must_use]
    pub fn default_fields() -> BTreeMap<String, String> {
        [
            ("summary", "Name"),
            ("status", "Status"),
            ("priority", "Priority"),
            ("assignee", "Assignee"),
            ("reporter", "Reporter"),
            ("created", "Created"),
            ("labels", "Tags"),
            ("description", "Description"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Iterate `(jira_field_id, notion_property)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Jira field ids to request in searches.
    ///
    /// `key` is always returned by Jira and is never requested explicitly.
    /// `created`, `updated` and `assignee` are always requested because the
    /// engine needs them regardless of the mapping.
    #[must_use]
    pub fn jira_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .fields
            .keys()
            .filter(|k| k.as_str() != "key")
            .cloned()
            .collect();
        for required in ["created", "updated", "assignee"] {
            if !fields.iter().any(|f| f == required) {
                fields.push(required.to_string());
            }
        }
        fields
    }

    /// The mapped Jira field ids a changelog item touches.
    #[must_use]
    pub fn tracked_by(&self, item: &ChangeItem) -> Vec<&str> {
        self.fields
            .keys()
            .filter(|id| item.touches(id))
            .map(String::as_str)
            .collect()
    }

    #[must_use]
    pub fn page_defaults(&self) -> &BTreeMap<String, Value> {
        &self.page_defaults
    }

    /// Resolve a Jira account id or email to a Notion user id.
    #[must_use]
    pub fn notion_user(&self, jira_identity: &str) -> Option<&str> {
        self.people
            .get(jira_identity)
            .or_else(|| {
                self.people
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(jira_identity))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(field: &str, field_id: Option<&str>) -> ChangeItem {
        ChangeItem {
            field: field.into(),
            field_id: field_id.map(Into::into),
            from: None,
            to: None,
        }
    }

    #[test]
    fn test_jira_fields_skip_key_and_add_required() {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), "Jira Issue Key".to_string());
        fields.insert("summary".to_string(), "Name".to_string());
        let mapping = FieldMapping::new(fields);

        let requested = mapping.jira_fields();
        assert!(!requested.contains(&"key".to_string()));
        assert!(requested.contains(&"summary".to_string()));
        assert!(requested.contains(&"updated".to_string()));
        assert!(requested.contains(&"assignee".to_string()));
    }

    #[test]
    fn test_tracked_by_matches_field_id_and_name() {
        let mapping = FieldMapping::new(FieldMapping::default_fields());
        assert_eq!(mapping.tracked_by(&change("status", Some("status"))), vec!["status"]);
        assert_eq!(mapping.tracked_by(&change("Priority", None)), vec!["priority"]);
        assert!(mapping.tracked_by(&change("Sprint", Some("customfield_10020"))).is_empty());
    }

    #[test]
    fn test_notion_user_lookup() {
        let mut people = BTreeMap::new();
        people.insert("Ana@Example.com".to_string(), "notion-user-1".to_string());
        let mapping = FieldMapping::default().with_people(people);

        assert_eq!(mapping.notion_user("ana@example.com"), Some("notion-user-1"));
        assert_eq!(mapping.notion_user("bob@example.com"), None);
    }
}
