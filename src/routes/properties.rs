use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::AppResult,
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::common::{
        db_pool, ensure_not_referenced, ensure_unique, ieq_filters, trim_text_fields, value_str,
    },
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreatePropertyInput,
        PageQuery, PropertyPath, UpdatePropertyInput,
    },
    state::AppState,
};

/// Everything filed under a property.
const PROPERTY_RECORDS: &[(&str, &str)] = &[
    ("units", "property_id"),
    ("leases", "property_id"),
    ("expenses", "property_id"),
    ("fines", "property_id"),
    ("inspections", "property_id"),
    ("utilities", "property_id"),
];

const DUPLICATE_PROPERTY: &str =
    "A property with the same name, address, city and state already exists.";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/properties",
            axum::routing::get(list_properties).post(create_property),
        )
        .route(
            "/properties/{property_id}",
            axum::routing::get(get_property)
                .patch(update_property)
                .delete(delete_property),
        )
}

async fn list_properties(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let rows = list_rows(
        pool,
        "properties",
        None,
        clamp_limit(query.limit),
        query.offset,
        "name",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_property(
    State(state): State<AppState>,
    Json(payload): Json<CreatePropertyInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    normalize_property(&mut record);
    ensure_unique(
        pool,
        "properties",
        identity_filters(&record),
        None,
        DUPLICATE_PROPERTY,
    )
    .await?;

    let created = create_row(pool, "properties", &record).await?;
    tracing::info!(property_id = %created["id"], "Property created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "properties", "id", &json!(path.property_id)).await?;
    Ok(Json(record))
}

async fn update_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    Json(payload): Json<UpdatePropertyInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let key = json!(path.property_id);

    let existing = get_row(pool, "properties", "id", &key).await?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    normalize_property(&mut patch);

    // Identity is checked on the merged record so partial edits cannot collide.
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());
    ensure_unique(
        pool,
        "properties",
        identity_filters(&merged),
        Some(key.clone()),
        DUPLICATE_PROPERTY,
    )
    .await?;

    let updated = update_row(pool, "properties", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let key = json!(path.property_id);
    get_row(pool, "properties", "id", &key).await?;

    ensure_not_referenced(
        pool,
        PROPERTY_RECORDS,
        &key,
        &format!(
            "Property {} still has units, leases or records and cannot be deleted.",
            path.property_id
        ),
    )
    .await?;

    let deleted = delete_row(pool, "properties", "id", &key).await?;
    tracing::info!(property_id = path.property_id, name = %value_str(&deleted, "name"), "Property deleted");
    Ok(Json(deleted))
}

fn normalize_property(record: &mut Map<String, Value>) {
    trim_text_fields(record);
    if let Some(Value::String(state_code)) = record.get_mut("state") {
        *state_code = state_code.to_ascii_uppercase();
    }
}

fn identity_filters(record: &Map<String, Value>) -> Map<String, Value> {
    ieq_filters(record, &["name", "address", "city", "state"])
}
