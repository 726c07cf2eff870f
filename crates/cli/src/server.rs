//! HTTP command surface. Every route answers with the JSON envelope;
//! handler failures degrade to an envelope with the matching status
//! code, never a panic.

use crate::config::FieldsyncConfig;
use crate::validation_worker::ValidationWorker;
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use fieldsync_cache::{transform_cache_key, TransformCache};
use fieldsync_notion::{apply_mappings, NotionClient};
use fieldsync_protocol::{Envelope, Field, FieldMapping, FieldSource, FieldType};
use fieldsync_store::{JsonFilePersister, MappingStore, MappingUpdate};
use log::info;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct AppState {
    pub store: Mutex<MappingStore>,
    pub cache: Mutex<TransformCache<Value>>,
    pub worker: ValidationWorker,
    pub notion: Option<NotionClient>,
    pub database_id: Option<String>,
}

pub type SharedState = Arc<AppState>;

type ApiResponse = (StatusCode, Json<Envelope<Value>>);

pub fn build_state(config: &FieldsyncConfig) -> Result<SharedState> {
    let store = MappingStore::open(Box::new(JsonFilePersister::new(&config.state_path)));
    let cache = TransformCache::new(config.cache_config());
    let worker = ValidationWorker::start(Duration::from_millis(config.api_timeout_ms));
    let notion = match config.notion_config() {
        Some(notion_config) => {
            Some(NotionClient::new(notion_config).context("Cannot build Notion client")?)
        }
        None => None,
    };

    Ok(Arc::new(AppState {
        store: Mutex::new(store),
        cache: Mutex::new(cache),
        worker,
        notion,
        database_id: config.database_id.clone(),
    }))
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/notion/schema", get(notion_schema))
        .route("/api/notion/test-mapping", post(test_mapping))
        .route("/api/cms/fields", get(list_fields).post(add_field))
        .route("/api/cms/fields/:id", delete(remove_field))
        .route("/api/cms/mappings", get(list_mappings).post(add_mapping))
        .route(
            "/api/cms/mappings/:id",
            delete(remove_mapping).patch(update_mapping),
        )
        .route("/api/cms/validate", post(validate_types))
        .route("/api/cms/cache/stats", get(cache_stats))
        .route("/api/cms/cache/clear", post(cache_clear))
        .with_state(state)
}

pub async fn serve(bind: &str, state: SharedState) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Cannot bind {bind}"))?;
    let local_addr = listener.local_addr()?;
    info!("Serving field mapper API: http://{local_addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn json_ok(data: impl serde::Serialize) -> ApiResponse {
    match serde_json::to_value(data) {
        Ok(value) => (StatusCode::OK, Json(Envelope::ok(value))),
        Err(err) => json_fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Response serialization failed: {err}"),
        ),
    }
}

fn json_ok_with_message(data: impl serde::Serialize, message: &str) -> ApiResponse {
    match serde_json::to_value(data) {
        Ok(value) => (
            StatusCode::OK,
            Json(Envelope::ok_with_message(value, message)),
        ),
        Err(err) => json_fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Response serialization failed: {err}"),
        ),
    }
}

fn json_fail(status: StatusCode, error: impl Into<String>) -> ApiResponse {
    (status, Json(Envelope::fail(error)))
}

fn bad_request(rejection: JsonRejection) -> ApiResponse {
    json_fail(
        StatusCode::BAD_REQUEST,
        format!("Malformed request body: {rejection}"),
    )
}

async fn health(State(state): State<SharedState>) -> ApiResponse {
    let store = state.store.lock().await;
    let cache = state.cache.lock().await;
    json_ok(json!({
        "status": "ok",
        "fields": store.fields().len(),
        "mappings": store.mappings().len(),
        "cache_size": cache.len(),
        "notion_configured": state.notion.is_some(),
    }))
}

async fn list_fields(State(state): State<SharedState>) -> ApiResponse {
    let store = state.store.lock().await;
    json_ok(store.fields())
}

async fn add_field(
    State(state): State<SharedState>,
    body: Result<Json<Field>, JsonRejection>,
) -> ApiResponse {
    let Json(field) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let mut store = state.store.lock().await;
    store.add_field(field.clone());
    json_ok_with_message(field, "Field added")
}

async fn remove_field(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResponse {
    let mut store = state.store.lock().await;
    if !store.remove_field(&id) {
        return json_fail(StatusCode::NOT_FOUND, format!("Field '{id}' not found"));
    }
    json_ok_with_message(json!({ "id": id }), "Field and dependent mappings removed")
}

/// Mappings are returned with validation recomputed from live field
/// state; the stored result is the creation-time snapshot.
async fn list_mappings(State(state): State<SharedState>) -> ApiResponse {
    let store = state.store.lock().await;
    let mappings: Vec<FieldMapping> = store
        .mappings()
        .iter()
        .map(|mapping| {
            let mut mapping = mapping.clone();
            mapping.validation = store.validation_for(&mapping.id);
            mapping
        })
        .collect();
    json_ok(mappings)
}

#[derive(Debug, Deserialize)]
struct AddMappingBody {
    notion_field_id: String,
    website_field_id: String,
}

async fn add_mapping(
    State(state): State<SharedState>,
    body: Result<Json<AddMappingBody>, JsonRejection>,
) -> ApiResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };

    let mut store = state.store.lock().await;
    if store
        .field(&body.notion_field_id, FieldSource::Notion)
        .is_none()
    {
        return json_fail(
            StatusCode::BAD_REQUEST,
            format!("Unknown notion field '{}'", body.notion_field_id),
        );
    }
    if store
        .field(&body.website_field_id, FieldSource::Website)
        .is_none()
    {
        return json_fail(
            StatusCode::BAD_REQUEST,
            format!("Unknown website field '{}'", body.website_field_id),
        );
    }

    // An incompatible pair is still created; the caller reads the
    // verdict off the returned mapping.
    let mapping = store.add_mapping(&body.notion_field_id, &body.website_field_id);
    json_ok_with_message(mapping, "Mapping created")
}

async fn remove_mapping(State(state): State<SharedState>, Path(id): Path<String>) -> ApiResponse {
    let mut store = state.store.lock().await;
    if !store.remove_mapping(&id) {
        return json_fail(StatusCode::NOT_FOUND, format!("Mapping '{id}' not found"));
    }
    json_ok_with_message(json!({ "id": id }), "Mapping removed")
}

async fn update_mapping(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<MappingUpdate>, JsonRejection>,
) -> ApiResponse {
    let Json(update) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let mut store = state.store.lock().await;
    if !store.update_mapping(&id, update) {
        return json_fail(StatusCode::NOT_FOUND, format!("Mapping '{id}' not found"));
    }
    json_ok(store.mapping(&id))
}

#[derive(Debug, Deserialize)]
struct ValidateBody {
    source: FieldType,
    target: FieldType,
}

async fn validate_types(
    State(state): State<SharedState>,
    body: Result<Json<ValidateBody>, JsonRejection>,
) -> ApiResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection),
    };
    let result = state.worker.validate(body.source, body.target).await;
    json_ok(result)
}

#[derive(Debug, Deserialize)]
struct SchemaParams {
    database: Option<String>,
}

async fn notion_schema(
    State(state): State<SharedState>,
    Query(params): Query<SchemaParams>,
) -> ApiResponse {
    let Some(notion) = &state.notion else {
        return json_fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Notion gateway is not configured",
        );
    };
    let Some(database_id) = params.database.or_else(|| state.database_id.clone()) else {
        return json_fail(StatusCode::BAD_REQUEST, "No database id configured");
    };

    match notion.database_schema(&database_id).await {
        Ok(fields) => json_ok(fields),
        Err(err) => json_fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct TestMappingBody {
    database_id: Option<String>,
}

async fn test_mapping(
    State(state): State<SharedState>,
    body: Option<Json<TestMappingBody>>,
) -> ApiResponse {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let Some(notion) = &state.notion else {
        return json_fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Notion gateway is not configured",
        );
    };
    let Some(database_id) = body.database_id.or_else(|| state.database_id.clone()) else {
        return json_fail(StatusCode::BAD_REQUEST, "No database id configured");
    };

    let mappings = {
        let store = state.store.lock().await;
        store.mappings().to_vec()
    };
    if mappings.is_empty() {
        return json_fail(StatusCode::BAD_REQUEST, "No mappings to test");
    }

    let batch = match notion.query_database(&database_id, 1, None).await {
        Ok(batch) => batch,
        Err(err) => return json_fail(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    };
    let Some(page) = batch.results.first() else {
        return json_fail(
            StatusCode::NOT_FOUND,
            "No test data available in the database",
        );
    };

    let mappings_fingerprint = match serde_json::to_value(&mappings) {
        Ok(value) => value,
        Err(err) => {
            return json_fail(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Mapping serialization failed: {err}"),
            )
        }
    };
    let key = transform_cache_key(&page.id, None, &mappings_fingerprint);

    let mut cache = state.cache.lock().await;
    if let Some(cached) = cache.get(&key) {
        return json_ok_with_message(cached, "Served from cache");
    }

    let run = apply_mappings(page, &mappings);
    match serde_json::to_value(&run) {
        Ok(value) => {
            cache.set(key, value.clone());
            json_ok(value)
        }
        Err(err) => json_fail(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Response serialization failed: {err}"),
        ),
    }
}

async fn cache_stats(State(state): State<SharedState>) -> ApiResponse {
    let cache = state.cache.lock().await;
    json_ok(cache.stats())
}

async fn cache_clear(State(state): State<SharedState>) -> ApiResponse {
    let mut cache = state.cache.lock().await;
    cache.clear();
    json_ok_with_message(json!({ "cleared": true }), "Cache cleared")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_cache::CacheConfig;
    use fieldsync_store::MemoryPersister;
    use pretty_assertions::assert_eq;

    fn test_state() -> SharedState {
        Arc::new(AppState {
            store: Mutex::new(MappingStore::open(Box::new(MemoryPersister::new()))),
            cache: Mutex::new(TransformCache::new(CacheConfig::default())),
            worker: ValidationWorker::start(Duration::from_secs(2)),
            notion: None,
            database_id: None,
        })
    }

    fn field(id: &str, field_type: FieldType, source: FieldSource) -> Field {
        Field {
            id: id.to_string(),
            name: id.to_string(),
            field_type,
            required: false,
            source,
        }
    }

    async fn seed_pair(state: &SharedState) {
        let mut store = state.store.lock().await;
        store.add_field(field("n1", FieldType::Title, FieldSource::Notion));
        store.add_field(field("w1", FieldType::Text, FieldSource::Website));
    }

    #[tokio::test]
    async fn add_and_list_fields() {
        let state = test_state();
        let (status, Json(envelope)) = add_field(
            State(state.clone()),
            Ok(Json(field("n1", FieldType::Title, FieldSource::Notion))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(envelope.success);

        let (_, Json(envelope)) = list_fields(State(state)).await;
        let fields: Vec<Field> = serde_json::from_value(envelope.data.unwrap()).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].id, "n1");
    }

    #[tokio::test]
    async fn mapping_with_unknown_field_is_bad_request() {
        let state = test_state();
        seed_pair(&state).await;
        let (status, Json(envelope)) = add_mapping(
            State(state),
            Ok(Json(AddMappingBody {
                notion_field_id: "ghost".to_string(),
                website_field_id: "w1".to_string(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!envelope.success);
        assert!(envelope.error.unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn incompatible_mapping_is_created_with_invalid_verdict() {
        let state = test_state();
        {
            let mut store = state.store.lock().await;
            store.add_field(field("n2", FieldType::Number, FieldSource::Notion));
            store.add_field(field("w2", FieldType::Image, FieldSource::Website));
        }
        let (status, Json(envelope)) = add_mapping(
            State(state),
            Ok(Json(AddMappingBody {
                notion_field_id: "n2".to_string(),
                website_field_id: "w2".to_string(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let mapping: FieldMapping = serde_json::from_value(envelope.data.unwrap()).unwrap();
        assert!(!mapping.validation.unwrap().is_valid);
    }

    #[tokio::test]
    async fn remove_field_cascades_into_mappings() {
        let state = test_state();
        seed_pair(&state).await;
        add_mapping(
            State(state.clone()),
            Ok(Json(AddMappingBody {
                notion_field_id: "n1".to_string(),
                website_field_id: "w1".to_string(),
            })),
        )
        .await;

        let (status, _) = remove_field(State(state.clone()), Path("n1".to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let (_, Json(envelope)) = list_mappings(State(state)).await;
        let mappings: Vec<FieldMapping> = serde_json::from_value(envelope.data.unwrap()).unwrap();
        assert!(mappings.is_empty());
    }

    #[tokio::test]
    async fn missing_resources_are_not_found() {
        let state = test_state();
        let (status, _) = remove_field(State(state.clone()), Path("ghost".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = remove_mapping(State(state.clone()), Path("ghost".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = update_mapping(
            State(state),
            Path("ghost".to_string()),
            Ok(Json(MappingUpdate::default())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validate_route_returns_result_as_data() {
        let state = test_state();
        let (status, Json(envelope)) = validate_types(
            State(state),
            Ok(Json(ValidateBody {
                source: FieldType::Title,
                target: FieldType::Text,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(envelope.success);
        let data = envelope.data.unwrap();
        assert_eq!(data["is_valid"], json!(true));
    }

    #[tokio::test]
    async fn notion_routes_fail_without_gateway() {
        let state = test_state();
        let (status, Json(envelope)) =
            notion_schema(State(state.clone()), Query(SchemaParams { database: None })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!envelope.success);

        let (status, _) = test_mapping(State(state), None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn cache_stats_and_clear_round() {
        let state = test_state();
        {
            let mut cache = state.cache.lock().await;
            cache.set("k", json!(1));
            let _ = cache.get("k");
        }
        let (_, Json(envelope)) = cache_stats(State(state.clone())).await;
        let stats = envelope.data.unwrap();
        assert_eq!(stats["size"], json!(1));
        assert_eq!(stats["hits"], json!(1));

        cache_clear(State(state.clone())).await;
        let (_, Json(envelope)) = cache_stats(State(state)).await;
        let stats = envelope.data.unwrap();
        assert_eq!(stats["size"], json!(0));
        assert_eq!(stats["hit_rate"], json!(0.0));
    }
}
