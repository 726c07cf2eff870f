//! Typed model of Notion page property values and plain-value
//! extraction. Parsing is total: unknown property kinds land in
//! `NotionProperty::Unrecognized` with the raw payload attached, so one
//! unexpected property never aborts a batch.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RichTextFragment {
    #[serde(default)]
    pub plain_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DateValue {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UrlRef {
    pub url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileRef {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<UrlRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<UrlRef>,
}

impl FileRef {
    fn url(&self) -> String {
        self.file
            .as_ref()
            .or(self.external.as_ref())
            .map(|r| r.url.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersonRef {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One page property, tagged by the Notion API `type` discriminant.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotionProperty {
    Title {
        title: Vec<RichTextFragment>,
    },
    RichText {
        rich_text: Vec<RichTextFragment>,
    },
    Number {
        number: Option<f64>,
    },
    Select {
        select: Option<SelectOption>,
    },
    MultiSelect {
        multi_select: Vec<SelectOption>,
    },
    Date {
        date: Option<DateValue>,
    },
    Files {
        files: Vec<FileRef>,
    },
    Checkbox {
        checkbox: bool,
    },
    Url {
        url: Option<String>,
    },
    Email {
        email: Option<String>,
    },
    Status {
        status: Option<SelectOption>,
    },
    People {
        people: Vec<PersonRef>,
    },
    CreatedTime {
        created_time: String,
    },
    LastEditedTime {
        last_edited_time: String,
    },
    /// Any property kind this model does not cover, raw payload kept.
    Unrecognized {
        kind: String,
        raw: Value,
    },
}

impl NotionProperty {
    /// Total parse of one property value. A known kind whose payload
    /// does not match the expected shape also falls back to
    /// `Unrecognized` rather than erroring.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        fn payload<T: serde::de::DeserializeOwned>(value: &Value, key: &str) -> Option<T> {
            serde_json::from_value(value.get(key)?.clone()).ok()
        }

        let parsed = match kind.as_str() {
            "title" => payload(value, "title").map(|title| NotionProperty::Title { title }),
            "rich_text" => {
                payload(value, "rich_text").map(|rich_text| NotionProperty::RichText { rich_text })
            }
            "number" => payload(value, "number").map(|number| NotionProperty::Number { number }),
            "select" => payload(value, "select").map(|select| NotionProperty::Select { select }),
            "multi_select" => payload(value, "multi_select")
                .map(|multi_select| NotionProperty::MultiSelect { multi_select }),
            "date" => payload(value, "date").map(|date| NotionProperty::Date { date }),
            "files" => payload(value, "files").map(|files| NotionProperty::Files { files }),
            "checkbox" => {
                payload(value, "checkbox").map(|checkbox| NotionProperty::Checkbox { checkbox })
            }
            "url" => payload(value, "url").map(|url| NotionProperty::Url { url }),
            "email" => payload(value, "email").map(|email| NotionProperty::Email { email }),
            "status" => payload(value, "status").map(|status| NotionProperty::Status { status }),
            "people" => payload(value, "people").map(|people| NotionProperty::People { people }),
            "created_time" => payload(value, "created_time")
                .map(|created_time| NotionProperty::CreatedTime { created_time }),
            "last_edited_time" => payload(value, "last_edited_time")
                .map(|last_edited_time| NotionProperty::LastEditedTime { last_edited_time }),
            _ => None,
        };

        parsed.unwrap_or_else(|| NotionProperty::Unrecognized {
            kind,
            raw: value.clone(),
        })
    }

    /// The Notion API `type` discriminant this property carries.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            NotionProperty::Title { .. } => "title",
            NotionProperty::RichText { .. } => "rich_text",
            NotionProperty::Number { .. } => "number",
            NotionProperty::Select { .. } => "select",
            NotionProperty::MultiSelect { .. } => "multi_select",
            NotionProperty::Date { .. } => "date",
            NotionProperty::Files { .. } => "files",
            NotionProperty::Checkbox { .. } => "checkbox",
            NotionProperty::Url { .. } => "url",
            NotionProperty::Email { .. } => "email",
            NotionProperty::Status { .. } => "status",
            NotionProperty::People { .. } => "people",
            NotionProperty::CreatedTime { .. } => "created_time",
            NotionProperty::LastEditedTime { .. } => "last_edited_time",
            NotionProperty::Unrecognized { kind, .. } => kind,
        }
    }

    /// Pull the plain value out of the property. Never fails; kinds the
    /// model does not cover surface as `ExtractedValue::Unsupported`.
    #[must_use]
    pub fn extract(&self) -> ExtractedValue {
        match self {
            NotionProperty::Title { title } => ExtractedValue::Text(join_plain_text(title)),
            NotionProperty::RichText { rich_text } => {
                ExtractedValue::Text(join_plain_text(rich_text))
            }
            NotionProperty::Number { number } => ExtractedValue::Number(*number),
            NotionProperty::Select { select } => ExtractedValue::Text(
                select
                    .as_ref()
                    .map(|opt| opt.name.clone())
                    .unwrap_or_default(),
            ),
            NotionProperty::MultiSelect { multi_select } => {
                ExtractedValue::List(multi_select.iter().map(|opt| opt.name.clone()).collect())
            }
            NotionProperty::Date { date } => ExtractedValue::Text(
                date.as_ref()
                    .and_then(|d| d.start.clone())
                    .unwrap_or_default(),
            ),
            NotionProperty::Files { files } => {
                ExtractedValue::List(files.iter().map(FileRef::url).collect())
            }
            NotionProperty::Checkbox { checkbox } => ExtractedValue::Flag(*checkbox),
            NotionProperty::Url { url } => {
                ExtractedValue::Text(url.clone().unwrap_or_default())
            }
            NotionProperty::Email { email } => {
                ExtractedValue::Text(email.clone().unwrap_or_default())
            }
            NotionProperty::Status { status } => ExtractedValue::Text(
                status
                    .as_ref()
                    .map(|opt| opt.name.clone())
                    .unwrap_or_default(),
            ),
            NotionProperty::People { people } => ExtractedValue::List(
                people
                    .iter()
                    .map(|p| p.name.clone().unwrap_or_else(|| p.id.clone()))
                    .collect(),
            ),
            NotionProperty::CreatedTime { created_time } => {
                ExtractedValue::Text(created_time.clone())
            }
            NotionProperty::LastEditedTime { last_edited_time } => {
                ExtractedValue::Text(last_edited_time.clone())
            }
            NotionProperty::Unrecognized { kind, .. } => ExtractedValue::Unsupported(kind.clone()),
        }
    }
}

impl<'de> Deserialize<'de> for NotionProperty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(NotionProperty::from_json(&value))
    }
}

fn join_plain_text(fragments: &[RichTextFragment]) -> String {
    fragments
        .iter()
        .map(|f| f.plain_text.as_str())
        .collect::<String>()
}

/// Plain value extracted from a property, ready for transformation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExtractedValue {
    Text(String),
    Number(Option<f64>),
    Flag(bool),
    List(Vec<String>),
    Empty,
    Unsupported(String),
}

impl ExtractedValue {
    /// Plain JSON rendering used in mapped output. Unsupported kinds
    /// become an explicit marker string instead of an error.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            ExtractedValue::Text(text) => Value::String(text.clone()),
            ExtractedValue::Number(number) => number
                .and_then(serde_json::Number::from_f64)
                .map_or(Value::Null, Value::Number),
            ExtractedValue::Flag(flag) => Value::Bool(*flag),
            ExtractedValue::List(values) => Value::Array(
                values
                    .iter()
                    .map(|v| Value::String(v.clone()))
                    .collect(),
            ),
            ExtractedValue::Empty => Value::Null,
            ExtractedValue::Unsupported(kind) => {
                Value::String(format!("Unsupported type: {kind}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_title_and_joins_fragments() {
        let prop = NotionProperty::from_json(&json!({
            "id": "abc",
            "type": "title",
            "title": [
                { "plain_text": "Brand " },
                { "plain_text": "Name" }
            ]
        }));
        assert_eq!(prop.extract(), ExtractedValue::Text("Brand Name".into()));
    }

    #[test]
    fn parses_every_documented_kind() {
        let cases = vec![
            (json!({"type": "rich_text", "rich_text": []}), "rich_text"),
            (json!({"type": "number", "number": 4.5}), "number"),
            (json!({"type": "select", "select": {"name": "A"}}), "select"),
            (
                json!({"type": "multi_select", "multi_select": [{"name": "A"}]}),
                "multi_select",
            ),
            (
                json!({"type": "date", "date": {"start": "2024-01-01"}}),
                "date",
            ),
            (json!({"type": "files", "files": []}), "files"),
            (json!({"type": "checkbox", "checkbox": true}), "checkbox"),
            (json!({"type": "url", "url": "https://x.test"}), "url"),
            (json!({"type": "email", "email": "a@b.test"}), "email"),
            (json!({"type": "status", "status": {"name": "Done"}}), "status"),
            (json!({"type": "people", "people": []}), "people"),
            (
                json!({"type": "created_time", "created_time": "2024-01-01T00:00:00Z"}),
                "created_time",
            ),
            (
                json!({"type": "last_edited_time", "last_edited_time": "2024-01-01T00:00:00Z"}),
                "last_edited_time",
            ),
        ];
        for (value, kind) in cases {
            let prop = NotionProperty::from_json(&value);
            assert_eq!(prop.kind(), kind, "raw: {value}");
            assert!(
                !matches!(prop, NotionProperty::Unrecognized { .. }),
                "fell back to unrecognized: {value}"
            );
        }
    }

    #[test]
    fn unknown_kind_keeps_raw_payload() {
        let raw = json!({"type": "rollup", "rollup": {"type": "number", "number": 3}});
        let prop = NotionProperty::from_json(&raw);
        match &prop {
            NotionProperty::Unrecognized { kind, raw: kept } => {
                assert_eq!(kind, "rollup");
                assert_eq!(kept, &raw);
            }
            other => panic!("expected unrecognized, got {other:?}"),
        }
        assert_eq!(prop.extract(), ExtractedValue::Unsupported("rollup".into()));
        assert_eq!(
            prop.extract().to_json(),
            json!("Unsupported type: rollup")
        );
    }

    #[test]
    fn malformed_known_kind_falls_back() {
        let prop = NotionProperty::from_json(&json!({"type": "checkbox", "checkbox": "yes"}));
        assert!(matches!(prop, NotionProperty::Unrecognized { .. }));
    }

    #[test]
    fn files_prefer_hosted_url_then_external() {
        let prop = NotionProperty::from_json(&json!({
            "type": "files",
            "files": [
                { "name": "a.png", "file": { "url": "https://files.test/a.png" } },
                { "name": "b.png", "external": { "url": "https://cdn.test/b.png" } },
                { "name": "c.png" }
            ]
        }));
        assert_eq!(
            prop.extract(),
            ExtractedValue::List(vec![
                "https://files.test/a.png".into(),
                "https://cdn.test/b.png".into(),
                String::new(),
            ])
        );
    }

    #[test]
    fn empty_select_extracts_empty_text() {
        let prop = NotionProperty::from_json(&json!({"type": "select", "select": null}));
        assert_eq!(prop.extract(), ExtractedValue::Text(String::new()));
    }

    #[test]
    fn deserialize_impl_is_total() {
        let props: std::collections::HashMap<String, NotionProperty> = serde_json::from_value(
            json!({
                "Name": {"type": "title", "title": [{"plain_text": "x"}]},
                "Weird": {"type": "verification", "verification": {}}
            }),
        )
        .expect("property map deserializes");
        assert_eq!(props.len(), 2);
        assert_eq!(props["Weird"].kind(), "verification");
    }
}
