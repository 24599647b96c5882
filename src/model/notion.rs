//! Notion-side types: page references, database schemas and property values.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Maximum characters Notion accepts in a single rich text object.
pub const RICH_TEXT_LIMIT: usize = 2000;

/// Maximum rich text objects in one property value or block.
pub const RICH_TEXT_MAX_SEGMENTS: usize = 100;

/// Maximum child blocks in one page creation request.
pub const CHILDREN_LIMIT: usize = 100;

/// A Notion page that mirrors one Jira issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotionPageRef {
    pub notion_page_id: String,
    pub issue_key: String,
}

/// Notion property types the mapper can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    RichText,
    Select,
    Status,
    MultiSelect,
    Date,
    Number,
    People,
    Checkbox,
    Url,
    /// Formulas, rollups, relations, files... read-only or not mapped.
    #[serde(other)]
    Unsupported,
}

impl PropertyKind {
    /// Parse the `type` string of a Notion database property.
    #[must_use]
    pub fn from_notion_type(kind: &str) -> Self {
        match kind {
            "title" => Self::Title,
            "rich_text" => Self::RichText,
            "select" => Self::Select,
            "status" => Self::Status,
            "multi_select" => Self::MultiSelect,
            "date" => Self::Date,
            "number" => Self::Number,
            "people" => Self::People,
            "checkbox" => Self::Checkbox,
            "url" => Self::Url,
            _ => Self::Unsupported,
        }
    }
}

/// Declared type (and option set, for selects) of one database property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySchema {
    pub kind: PropertyKind,
    /// Option names for select / status / multi_select. Empty means unrestricted.
    #[serde(default)]
    pub options: Vec<String>,
}

impl PropertySchema {
    #[must_use]
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            kind,
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_options<I, S>(kind: PropertyKind, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// Resolve an option name, case-insensitively, to its canonical spelling.
    #[must_use]
    pub fn resolve_option(&self, name: &str) -> Option<String> {
        if self.options.is_empty() {
            return Some(name.to_string());
        }
        self.options
            .iter()
            .find(|opt| opt.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Live property schema of a Notion database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub properties: BTreeMap<String, PropertySchema>,
}

impl DatabaseSchema {
    /// Add a property (builder style, mostly for tests).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertySchema> {
        self.properties.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }
}

/// A coerced value ready to be written to a Notion property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Select(String),
    Status(String),
    MultiSelect(Vec<String>),
    /// ISO-8601 date or date-time.
    Date(String),
    Number(f64),
    /// Notion user ids.
    People(Vec<String>),
    Checkbox(bool),
    Url(String),
    /// Explicitly clear the property.
    Empty(PropertyKind),
}

impl PropertyValue {
    /// Render this value as a Notion page property payload.
    #[must_use]
    pub fn to_notion_json(&self) -> Value {
        match self {
            Self::Title(text) => json!({ "title": rich_text_segments(text) }),
            Self::RichText(text) => json!({ "rich_text": rich_text_segments(text) }),
            Self::Select(name) => json!({ "select": { "name": name } }),
            Self::Status(name) => json!({ "status": { "name": name } }),
            Self::MultiSelect(names) => json!({
                "multi_select": names.iter().map(|n| json!({ "name": n })).collect::<Vec<_>>()
            }),
            Self::Date(start) => json!({ "date": { "start": start } }),
            Self::Number(n) => json!({ "number": n }),
            Self::People(ids) => json!({
                "people": ids.iter().map(|id| json!({ "object": "user", "id": id })).collect::<Vec<_>>()
            }),
            Self::Checkbox(checked) => json!({ "checkbox": checked }),
            Self::Url(url) => json!({ "url": url }),
            Self::Empty(kind) => match kind {
                PropertyKind::Title => json!({ "title": [] }),
                PropertyKind::RichText => json!({ "rich_text": [] }),
                PropertyKind::MultiSelect => json!({ "multi_select": [] }),
                PropertyKind::People => json!({ "people": [] }),
                PropertyKind::Select => json!({ "select": null }),
                PropertyKind::Status => json!({ "status": null }),
                PropertyKind::Date => json!({ "date": null }),
                PropertyKind::Number => json!({ "number": null }),
                PropertyKind::Url => json!({ "url": null }),
                PropertyKind::Checkbox => json!({ "checkbox": false }),
                PropertyKind::Unsupported => Value::Null,
            },
        }
    }
}

/// Split text into rich text objects of at most [`RICH_TEXT_LIMIT`] chars.
///
/// Text past [`RICH_TEXT_MAX_SEGMENTS`] segments is cut off.
fn rich_text_segments(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(RICH_TEXT_LIMIT)
        .take(RICH_TEXT_MAX_SEGMENTS)
        .map(|chunk| {
            let content: String = chunk.iter().collect();
            json!({ "type": "text", "text": { "content": content } })
        })
        .collect()
}

/// A content block appended to a newly created page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    /// Paragraph with a leading label and a hyperlink.
    Link { label: String, text: String, url: String },
    Paragraph(String),
}

impl Block {
    /// Split body text into paragraphs at blank lines, and wherever a
    /// paragraph would exceed [`RICH_TEXT_LIMIT`] chars. A single longer
    /// line keeps its own paragraph.
    #[must_use]
    pub fn paragraphs(text: &str) -> Vec<Self> {
        let mut blocks = Vec::new();
        let mut current = String::new();
        let mut len = 0;
        for line in text.lines() {
            let line_len = line.chars().count();
            let blank = line.trim().is_empty();
            if len > 0 && (blank || len + 1 + line_len > RICH_TEXT_LIMIT) {
                Self::push_paragraph(&mut blocks, std::mem::take(&mut current));
                len = 0;
            }
            if blank {
                continue;
            }
            if len > 0 {
                current.push('\n');
                len += 1;
            }
            current.push_str(line);
            len += line_len;
        }
        Self::push_paragraph(&mut blocks, current);
        blocks
    }

    fn push_paragraph(blocks: &mut Vec<Self>, text: String) {
        if !text.trim().is_empty() {
            blocks.push(Self::Paragraph(text));
        }
    }

    #[must_use]
    pub fn to_notion_json(&self) -> Value {
        match self {
            Self::Link { label, text, url } => json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [
                        { "type": "text", "text": { "content": label } },
                        { "type": "text", "text": { "content": text, "link": { "url": url } } }
                    ]
                }
            }),
            Self::Paragraph(text) => json!({
                "object": "block",
                "type": "paragraph",
                "paragraph": { "rich_text": rich_text_segments(text) }
            }),
        }
    }
}

/// Everything needed to create a page: properties plus body blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDraft {
    pub properties: BTreeMap<String, PropertyValue>,
    pub children: Vec<Block>,
}

impl PageDraft {
    /// Render the `properties` object of a Notion create/update request.
    #[must_use]
    pub fn properties_json(properties: &BTreeMap<String, PropertyValue>) -> Value {
        let map: serde_json::Map<String, Value> = properties
            .iter()
            .map(|(name, value)| (name.clone(), value.to_notion_json()))
            .collect();
        Value::Object(map)
    }
}
