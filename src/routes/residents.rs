use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::common::{
        db_pool, ensure_references, ensure_unique, id_references, ieq_filters, trim_text_fields,
        value_str, Reference,
    },
    schemas::{
        clamp_limit, patch_map, remove_nulls, serialize_to_map, validate_input,
        CreateResidentInput, ResidentPath, ResidentsQuery, UpdateResidentInput,
    },
    state::AppState,
};

const NAME_COLUMNS: &[&str] = &["first_name", "last_name"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/residents",
            axum::routing::get(list_residents).post(create_resident),
        )
        .route(
            "/residents/{resident_id}",
            axum::routing::get(get_resident)
                .patch(update_resident)
                .delete(delete_resident),
        )
}

async fn list_residents(
    State(state): State<AppState>,
    Query(query): Query<ResidentsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut resident_filters = Map::new();
    if let Some(lease_id) = query.lease_id.as_deref().map(str::trim) {
        if !lease_id.is_empty() {
            resident_filters.insert("lease_id".to_string(), json!(lease_id));
        }
    }
    if let Some(unit_id) = query.unit_id {
        resident_filters.insert("unit_id".to_string(), json!(unit_id));
    }
    if let Some(active) = query.active {
        resident_filters.insert("active".to_string(), Value::Bool(active));
    }

    let rows = list_rows(
        pool,
        "residents",
        Some(&resident_filters),
        clamp_limit(query.limit),
        query.offset,
        "last_name",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_resident(
    State(state): State<AppState>,
    Json(payload): Json<CreateResidentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let mut record = remove_nulls(serialize_to_map(&payload));
    normalize_resident(&mut record)?;
    let pool = db_pool(&state)?;

    ensure_placement(pool, &record).await?;
    ensure_unique(
        pool,
        "residents",
        ieq_filters(&record, NAME_COLUMNS),
        None,
        &duplicate_message(&record),
    )
    .await?;

    let created = create_row(pool, "residents", &record).await?;
    tracing::info!(
        resident_id = %created["id"],
        lease_id = %value_str(&created, "lease_id"),
        "Resident created"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_resident(
    State(state): State<AppState>,
    Path(path): Path<ResidentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "residents", "id", &json!(path.resident_id)).await?;
    Ok(Json(record))
}

async fn update_resident(
    State(state): State<AppState>,
    Path(path): Path<ResidentPath>,
    Json(payload): Json<UpdateResidentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = patch_map(&payload, &payload.cleared_fields());
    normalize_resident(&mut patch)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let pool = db_pool(&state)?;
    let key = json!(path.resident_id);

    let existing = get_row(pool, "residents", "id", &key).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());

    if patch.contains_key("lease_id") || patch.contains_key("unit_id") {
        ensure_placement(pool, &merged).await?;
    }
    if NAME_COLUMNS.iter().any(|column| patch.contains_key(*column)) {
        ensure_unique(
            pool,
            "residents",
            ieq_filters(&merged, NAME_COLUMNS),
            Some(key.clone()),
            &duplicate_message(&merged),
        )
        .await?;
    }

    let updated = update_row(pool, "residents", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_resident(
    State(state): State<AppState>,
    Path(path): Path<ResidentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "residents", "id", &json!(path.resident_id)).await?;
    tracing::info!(resident_id = path.resident_id, "Resident deleted");
    Ok(Json(deleted))
}

fn normalize_resident(record: &mut Map<String, Value>) -> AppResult<()> {
    trim_text_fields(record);
    if let Some(Value::String(email)) = record.get_mut("email") {
        *email = email.to_lowercase();
    }
    for field in ["mobile_number", "home_number"] {
        if let Some(number) = record.get(field).and_then(Value::as_str) {
            if !is_phone_number(number) {
                return Err(AppError::BadRequest(format!(
                    "{field} must be a phone number in international format."
                )));
            }
        }
    }
    Ok(())
}

/// Optional `+`, then 2 to 15 digits with no leading zero.
fn is_phone_number(raw: &str) -> bool {
    let digits = raw.strip_prefix('+').unwrap_or(raw);
    (2..=15).contains(&digits.len())
        && digits.bytes().all(|byte| byte.is_ascii_digit())
        && !digits.starts_with('0')
}

fn duplicate_message(record: &Map<String, Value>) -> String {
    let first = record.get("first_name").and_then(Value::as_str).unwrap_or_default();
    let last = record.get("last_name").and_then(Value::as_str).unwrap_or_default();
    format!("Resident {first} {last} already exists.")
}

fn placement_references(lease_id: Option<&str>, unit_id: Option<i64>) -> Vec<Reference> {
    let mut references: Vec<Reference> = lease_id.map(Reference::lease).into_iter().collect();
    references.extend(id_references([("units", "Unit", unit_id)]));
    references
}

/// Lease and unit must exist, and a resident placed on both must live on
/// the unit the lease covers.
async fn ensure_placement(pool: &sqlx::PgPool, record: &Map<String, Value>) -> AppResult<()> {
    let lease_id = record.get("lease_id").and_then(Value::as_str);
    let unit_id = record.get("unit_id").and_then(Value::as_i64);
    ensure_references(pool, placement_references(lease_id, unit_id)).await?;

    if let (Some(lease_id), Some(unit_id)) = (lease_id, unit_id) {
        let lease = get_row(pool, "leases", "lease_id", &json!(lease_id)).await?;
        check_lease_unit(&lease, unit_id)?;
    }
    Ok(())
}

fn check_lease_unit(lease: &Value, unit_id: i64) -> AppResult<()> {
    if lease.get("unit_id").and_then(Value::as_i64) == Some(unit_id) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Lease {} does not cover unit {unit_id}.",
        value_str(lease, "lease_id")
    )))
}
