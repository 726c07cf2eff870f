//! Notion API gateway. Thin by design: fetch, shape, and get out.
//! Every outbound call races a timeout so a stuck request reports a
//! failure instead of hanging the caller.

use fieldsync_protocol::{Field, FieldSource, FieldType};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum NotionError {
    #[error("Notion token is not configured")]
    MissingToken,

    #[error("Invalid gateway configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notion request timed out")]
    Timeout,

    #[error("Notion API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl NotionConfig {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// One page as returned by a database query. Properties stay raw here;
/// `NotionProperty::from_json` shapes them at the point of use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, Value>,
}

impl Page {
    /// Locate a property by its Notion field id (not its display name).
    #[must_use]
    pub fn property_by_field_id(&self, field_id: &str) -> Option<(&str, &Value)> {
        self.properties.iter().find_map(|(name, value)| {
            (value.get("id").and_then(Value::as_str) == Some(field_id))
                .then_some((name.as_str(), value))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryPage {
    #[serde(default)]
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatabaseResponse {
    #[serde(default)]
    properties: BTreeMap<String, DatabaseProperty>,
}

#[derive(Debug, Deserialize)]
struct DatabaseProperty {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug)]
pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl NotionClient {
    pub fn new(config: NotionConfig) -> crate::Result<Self> {
        if config.token.trim().is_empty() {
            return Err(NotionError::MissingToken);
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| NotionError::Config("token contains invalid characters".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
        })
    }

    /// One page of database query results.
    pub async fn query_database(
        &self,
        database_id: &str,
        page_size: u32,
        start_cursor: Option<&str>,
    ) -> crate::Result<QueryPage> {
        let mut body = json!({ "page_size": page_size });
        if let Some(cursor) = start_cursor {
            body["start_cursor"] = json!(cursor);
        }

        let url = format!("{}/databases/{database_id}/query", self.base_url);
        let response = self
            .race(self.http.post(&url).json(&body).send())
            .await?;
        Self::decode(response).await
    }

    /// Every page of the database, following cursors until exhausted.
    pub async fn list_all_pages(&self, database_id: &str) -> crate::Result<Vec<Page>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let batch = self
                .query_database(database_id, DEFAULT_PAGE_SIZE, cursor.as_deref())
                .await?;
            pages.extend(batch.results);
            if !batch.has_more {
                break;
            }
            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!("Fetched {} pages from database {database_id}", pages.len());
        Ok(pages)
    }

    /// Introspect the database schema into notion-side fields.
    /// Property kinds outside the supported set are skipped.
    pub async fn database_schema(&self, database_id: &str) -> crate::Result<Vec<Field>> {
        let url = format!("{}/databases/{database_id}", self.base_url);
        let response = self.race(self.http.get(&url).send()).await?;
        let database: DatabaseResponse = Self::decode(response).await?;

        let mut fields = Vec::new();
        for (name, property) in database.properties {
            let Some(field_type) = schema_field_type(&property.kind) else {
                debug!(
                    "Skipping schema property '{name}' with unsupported kind '{}'",
                    property.kind
                );
                continue;
            };
            fields.push(Field {
                id: property.id,
                name,
                field_type,
                required: false,
                source: FieldSource::Notion,
            });
        }
        Ok(fields)
    }

    async fn race<F>(&self, fut: F) -> crate::Result<reqwest::Response>
    where
        F: std::future::Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(NotionError::Timeout),
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> crate::Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn api_error(status: StatusCode, body: &str) -> NotionError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .and_then(|b| match (b.code, b.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (_, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .unwrap_or_else(|| "Unknown Notion error".to_string());
    NotionError::Api {
        status: status.as_u16(),
        message,
    }
}

fn schema_field_type(kind: &str) -> Option<FieldType> {
    match kind {
        "title" => Some(FieldType::Title),
        "rich_text" => Some(FieldType::RichText),
        "number" => Some(FieldType::Number),
        "checkbox" => Some(FieldType::Checkbox),
        "date" => Some(FieldType::Date),
        "select" => Some(FieldType::Select),
        "multi_select" => Some(FieldType::MultiSelect),
        "status" => Some(FieldType::Status),
        "url" => Some(FieldType::Url),
        "email" => Some(FieldType::Email),
        "files" => Some(FieldType::File),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_page_deserializes_cursor_fields() {
        let page: QueryPage = serde_json::from_value(json!({
            "results": [
                { "id": "p1", "properties": { "Name": { "id": "ti", "type": "title", "title": [] } } }
            ],
            "has_more": true,
            "next_cursor": "cur-2"
        }))
        .unwrap();
        assert_eq!(page.results.len(), 1);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("cur-2"));
    }

    #[test]
    fn property_lookup_matches_field_id_not_name() {
        let page: Page = serde_json::from_value(json!({
            "id": "p1",
            "properties": {
                "Name": { "id": "ti", "type": "title", "title": [] },
                "Score": { "id": "nu", "type": "number", "number": 3 }
            }
        }))
        .unwrap();
        let (name, value) = page.property_by_field_id("nu").unwrap();
        assert_eq!(name, "Score");
        assert_eq!(value["type"], "number");
        assert!(page.property_by_field_id("Name").is_none());
    }

    #[test]
    fn schema_field_types_cover_supported_kinds_and_skip_others() {
        assert_eq!(schema_field_type("title"), Some(FieldType::Title));
        assert_eq!(schema_field_type("files"), Some(FieldType::File));
        assert_eq!(schema_field_type("rollup"), None);
    }

    #[test]
    fn api_error_prefers_body_message() {
        let err = api_error(
            StatusCode::NOT_FOUND,
            r#"{"code": "object_not_found", "message": "Could not find database"}"#,
        );
        match err {
            NotionError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "object_not_found: Could not find database");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn api_error_tolerates_unparseable_body() {
        let err = api_error(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        match err {
            NotionError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Unknown Notion error");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn empty_token_is_rejected() {
        let err = NotionClient::new(NotionConfig::new("  ")).unwrap_err();
        assert!(matches!(err, NotionError::MissingToken));
    }
}
