use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which schema a field was fetched from. Fields are immutable once
/// fetched; the source decides which side of a mapping they may occupy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Notion,
    Website,
}

/// Field types shared by both schemas. The compatibility table in
/// `compatibility` decides which pairs can be mapped directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Title,
    RichText,
    Text,
    Number,
    Boolean,
    Checkbox,
    Date,
    Select,
    MultiSelect,
    Status,
    Url,
    Email,
    Image,
    File,
}

impl FieldType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Title => "title",
            FieldType::RichText => "rich_text",
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Status => "status",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Image => "image",
            FieldType::File => "file",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named, typed attribute belonging to one of the two schemas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Field {
    pub id: String,
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    pub source: FieldSource,
}

/// A user-declared correspondence between one Notion field and one
/// website field. `validation` is the result computed when the mapping
/// was created; `MappingStore::validation_for` recomputes from live
/// field state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FieldMapping {
    pub id: String,
    pub notion_field_id: String,
    pub website_field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Transformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
}

impl FieldMapping {
    /// Canonical id for a notion/website field pair.
    #[must_use]
    pub fn pair_id(notion_field_id: &str, website_field_id: &str) -> String {
        format!("{notion_field_id}-{website_field_id}")
    }
}

fn default_separator() -> String {
    "-".to_string()
}

fn default_join_separator() -> String {
    ", ".to_string()
}

/// Value transforms applied when a mapping is materialized. A transform
/// applied to a value of the wrong shape returns the value unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformation {
    Lowercase,
    Uppercase,
    Capitalize,
    Trim,
    Slug {
        #[serde(default = "default_separator")]
        separator: String,
    },
    Round,
    Floor,
    Ceil,
    FirstOnly,
    Join {
        #[serde(default = "default_join_separator")]
        separator: String,
    },
    Split {
        #[serde(default = "default_separator")]
        separator: String,
    },
    ToText,
    WrapList,
}

/// Outcome of a compatibility check. Always data, never an error type;
/// callers must inspect `is_valid`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ValidationResult {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ValidationDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ValidationDetails {
    #[serde(default)]
    pub compatible_types: Vec<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            error: None,
            details: None,
        }
    }

    #[must_use]
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(error.into()),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: ValidationDetails) -> Self {
        self.details = Some(details);
        self
    }
}
