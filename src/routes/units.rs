use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{
        count_rows, create_row, delete_row, get_row, list_rows, update_row,
    },
    routes::common::{db_pool, ensure_reference, ensure_unique, filters, trim_text_fields},
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreateUnitInput, UnitPath,
        UnitsQuery, UpdateUnitInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/units", axum::routing::get(list_units).post(create_unit))
        .route(
            "/units/{unit_id}",
            axum::routing::get(get_unit)
                .patch(update_unit)
                .delete(delete_unit),
        )
}

async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<UnitsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut unit_filters = Map::new();
    if let Some(property_id) = query.property_id {
        unit_filters.insert("property_id".to_string(), json!(property_id));
    }
    if let Some(rented) = query.rented {
        unit_filters.insert("rented".to_string(), Value::Bool(rented));
    }

    let rows = list_rows(
        pool,
        "units",
        Some(&unit_filters),
        clamp_limit(query.limit),
        query.offset,
        "unit_number",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_unit(
    State(state): State<AppState>,
    Json(payload): Json<CreateUnitInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;

    ensure_reference(
        pool,
        "properties",
        "id",
        json!(payload.property_id),
        "Property",
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    ensure_unit_number_free(pool, payload.property_id, &record, None).await?;

    let created = create_row(pool, "units", &record).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "units", "id", &json!(path.unit_id)).await?;
    Ok(Json(record))
}

async fn update_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
    Json(payload): Json<UpdateUnitInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let key = json!(path.unit_id);

    let existing = get_row(pool, "units", "id", &key).await?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut patch);

    if patch.contains_key("unit_number") {
        let property_id = existing
            .get("property_id")
            .and_then(Value::as_i64)
            .unwrap_or_default();
        ensure_unit_number_free(pool, property_id, &patch, Some(key.clone())).await?;
    }

    let updated = update_row(pool, "units", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_unit(
    State(state): State<AppState>,
    Path(path): Path<UnitPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let key = json!(path.unit_id);
    get_row(pool, "units", "id", &key).await?;

    let active_leases = count_rows(
        pool,
        "leases",
        Some(&filters([("unit_id", key.clone()), ("active", Value::Bool(true))])),
    )
    .await?;
    if active_leases > 0 {
        return Err(AppError::BadRequest(format!(
            "Unit {} is referenced by an active lease.",
            path.unit_id
        )));
    }

    let deleted = delete_row(pool, "units", "id", &key).await?;
    Ok(Json(deleted))
}

async fn ensure_unit_number_free(
    pool: &sqlx::PgPool,
    property_id: i64,
    record: &Map<String, Value>,
    exclude_id: Option<Value>,
) -> AppResult<()> {
    let unit_number = record.get("unit_number").cloned().unwrap_or(Value::Null);
    ensure_unique(
        pool,
        "units",
        filters([
            ("property_id", json!(property_id)),
            ("unit_number__ieq", unit_number),
        ]),
        exclude_id,
        "Unit number already exists for this property.",
    )
    .await
}
