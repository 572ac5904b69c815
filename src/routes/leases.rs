use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    ledger::{LedgerSummary, RebuildOutcome},
    repository::table_service::{
        count_rows, create_row, delete_row, get_row, list_rows, update_row,
    },
    routes::common::{
        db_pool, ensure_reference, ensure_unique, filters, record_date, trim_text_fields, value_f64,
    },
    schemas::{
        clamp_limit, patch_map, remove_nulls, serialize_to_map, validate_input, CreateLeaseInput,
        LeasePath, LeasesQuery, UpdateLeaseInput,
    },
    state::AppState,
};

/// Fields the ledger is derived from. Changing any of them rewrites it.
const LEDGER_TERMS: &[&str] = &["monthly_rent", "lease_date", "lease_start_date"];

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/leases", axum::routing::get(list_leases).post(create_lease))
        .route(
            "/leases/{lease_id}",
            axum::routing::get(get_lease)
                .patch(update_lease)
                .delete(delete_lease),
        )
        .route("/leases/{lease_id}/ledger", axum::routing::get(lease_ledger))
        .route(
            "/leases/{lease_id}/ledger/recalculate",
            axum::routing::post(recalculate_ledger),
        )
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<LeasesQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut lease_filters = Map::new();
    if let Some(property_id) = query.property_id {
        lease_filters.insert("property_id".to_string(), json!(property_id));
    }
    if let Some(unit_id) = query.unit_id {
        lease_filters.insert("unit_id".to_string(), json!(unit_id));
    }
    if let Some(active) = query.active {
        lease_filters.insert("active".to_string(), Value::Bool(active));
    }

    let rows = list_rows(
        pool,
        "leases",
        Some(&lease_filters),
        clamp_limit(query.limit),
        query.offset,
        "lease_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_lease(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeaseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let lease_id = payload.lease_id.trim();
    if lease_id.is_empty() {
        return Err(AppError::BadRequest("Lease ID cannot be empty.".to_string()));
    }
    validate_lease_dates(
        payload.lease_date,
        payload.lease_start_date,
        payload.lease_end_date,
        state.ledger.today(),
    )?;
    let pool = db_pool(&state)?;

    ensure_unit_on_property(pool, payload.property_id, payload.unit_id).await?;
    ensure_unique(
        pool,
        "leases",
        filters([("lease_id", json!(lease_id))]),
        None,
        &format!("Lease with ID {lease_id} already exists."),
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    let created = create_row(pool, "leases", &record).await?;
    tracing::info!(lease_id, property_id = payload.property_id, "Lease created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "leases", "lease_id", &json!(path.lease_id)).await?;
    Ok(Json(record))
}

async fn update_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    Json(payload): Json<UpdateLeaseInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let key = json!(path.lease_id);

    let existing = get_row(pool, "leases", "lease_id", &key).await?;
    let mut patch = patch_map(&payload, &payload.cleared_fields());
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());

    validate_lease_dates(
        required_date(&merged, "lease_date")?,
        record_date(&merged, "lease_start_date"),
        record_date(&merged, "lease_end_date"),
        state.ledger.today(),
    )?;

    if patch.contains_key("property_id") || patch.contains_key("unit_id") {
        let property_id = merged.get("property_id").and_then(Value::as_i64).unwrap_or_default();
        let unit_id = merged.get("unit_id").and_then(Value::as_i64).unwrap_or_default();
        ensure_unit_on_property(pool, property_id, unit_id).await?;
    }

    let target_id = match patch.get("lease_id").and_then(Value::as_str) {
        Some(new_id) if new_id != path.lease_id => {
            if new_id.is_empty() {
                return Err(AppError::BadRequest("Lease ID cannot be empty.".to_string()));
            }
            ensure_unique(
                pool,
                "leases",
                filters([("lease_id", json!(new_id))]),
                None,
                &format!("Lease with ID {new_id} already exists."),
            )
            .await?;
            new_id.to_string()
        }
        _ => path.lease_id.clone(),
    };

    let updated = update_row(pool, "leases", "lease_id", &key, &patch).await?;

    if ledger_terms_changed(&existing, &patch) {
        state
            .ledger
            .refresh_ledger(&target_id, "lease terms changed")
            .await;
    }
    Ok(Json(updated))
}

async fn delete_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let key = json!(path.lease_id);
    get_row(pool, "leases", "lease_id", &key).await?;

    let payments = count_rows(
        pool,
        "lease_payments",
        Some(&filters([("lease_id", key.clone())])),
    )
    .await?;
    if payments > 0 {
        return Err(AppError::Conflict(format!(
            "Lease {} has {payments} payment(s) and cannot be deleted.",
            path.lease_id
        )));
    }

    let deleted = delete_row(pool, "leases", "lease_id", &key).await?;
    tracing::info!(lease_id = %path.lease_id, "Lease deleted");
    Ok(Json(deleted))
}

async fn lease_ledger(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<LedgerSummary>> {
    let summary = state.ledger.summary(&path.lease_id).await?;
    Ok(Json(summary))
}

async fn recalculate_ledger(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
) -> AppResult<Json<Value>> {
    let outcome = state.ledger.rebuild_ledger(&path.lease_id).await?;
    if outcome == RebuildOutcome::LeaseMissing {
        return Err(AppError::NotFound(format!(
            "Lease with ID {} not found.",
            path.lease_id
        )));
    }
    tracing::info!(lease_id = %path.lease_id, ?outcome, "Lease ledger recalculated on request");

    let mut body = serialize_to_map(&outcome);
    body.insert("lease_id".to_string(), Value::String(path.lease_id));
    Ok(Json(Value::Object(body)))
}

async fn ensure_unit_on_property(
    pool: &sqlx::PgPool,
    property_id: i64,
    unit_id: i64,
) -> AppResult<()> {
    ensure_reference(pool, "properties", "id", json!(property_id), "Property").await?;
    let unit = get_row(pool, "units", "id", &json!(unit_id))
        .await
        .map_err(|error| match error {
            AppError::NotFound(_) => {
                AppError::BadRequest(format!("Unit with ID {unit_id} not found."))
            }
            other => other,
        })?;
    if unit.get("property_id").and_then(Value::as_i64) != Some(property_id) {
        return Err(AppError::BadRequest(format!(
            "Unit {unit_id} does not belong to property {property_id}."
        )));
    }
    Ok(())
}

fn validate_lease_dates(
    lease_date: NaiveDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<()> {
    if lease_date > today {
        return Err(AppError::BadRequest(
            "Lease date cannot be in the future.".to_string(),
        ));
    }
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::BadRequest(
                "Lease end date must be on or after lease start date.".to_string(),
            ));
        }
    }
    Ok(())
}

fn required_date(record: &Map<String, Value>, key: &str) -> AppResult<NaiveDate> {
    record_date(record, key)
        .ok_or_else(|| AppError::Internal(format!("Lease record has no valid {key}.")))
}

fn ledger_terms_changed(existing: &Value, patch: &Map<String, Value>) -> bool {
    LEDGER_TERMS.iter().any(|field| {
        let Some(next) = patch.get(*field) else {
            return false;
        };
        if *field == "monthly_rent" {
            return value_f64(existing, field) != next.as_f64();
        }
        existing.get(*field) != Some(next)
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::{ledger_terms_changed, validate_lease_dates};
    use crate::error::AppError;
    use crate::routes::common::record_date;
    use crate::schemas::{patch_map, UpdateLeaseInput};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn rejects_future_lease_date() {
        let today = date(2024, 3, 15);
        assert!(validate_lease_dates(date(2024, 3, 15), None, None, today).is_ok());
        assert!(matches!(
            validate_lease_dates(date(2024, 3, 16), None, None, today),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn rejects_end_before_start() {
        let today = date(2024, 3, 15);
        let result = validate_lease_dates(
            date(2024, 1, 1),
            Some(date(2024, 2, 1)),
            Some(date(2024, 1, 31)),
            today,
        );
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert!(validate_lease_dates(
            date(2024, 1, 1),
            Some(date(2024, 2, 1)),
            Some(date(2024, 2, 1)),
            today
        )
        .is_ok());
    }

    #[test]
    fn reads_dates_from_rows() {
        let record = map(json!({ "lease_date": "2024-01-05", "lease_end_date": null }));
        assert_eq!(record_date(&record, "lease_date"), Some(date(2024, 1, 5)));
        assert_eq!(record_date(&record, "lease_end_date"), None);
    }

    #[test]
    fn detects_ledger_term_changes() {
        let existing = json!({
            "lease_id": "L-1",
            "monthly_rent": 1000.0,
            "lease_date": "2024-01-01",
            "lease_start_date": null,
            "active": true
        });
        assert!(!ledger_terms_changed(&existing, &map(json!({ "active": false }))));
        assert!(!ledger_terms_changed(&existing, &map(json!({ "monthly_rent": 1000 }))));
        assert!(ledger_terms_changed(&existing, &map(json!({ "monthly_rent": 1100.0 }))));
        assert!(ledger_terms_changed(
            &existing,
            &map(json!({ "lease_start_date": "2024-02-01" }))
        ));
        assert!(!ledger_terms_changed(
            &existing,
            &map(json!({ "lease_date": "2024-01-01" }))
        ));
    }

    #[test]
    fn clearing_start_date_rewrites_the_ledger() {
        let payload: UpdateLeaseInput =
            serde_json::from_value(json!({ "lease_start_date": null })).expect("valid payload");
        let patch = patch_map(&payload, &payload.cleared_fields());
        assert_eq!(patch.get("lease_start_date"), Some(&Value::Null));
        assert!(!patch.contains_key("lease_end_date"));

        let started = json!({
            "monthly_rent": 1000.0,
            "lease_date": "2024-01-01",
            "lease_start_date": "2024-02-01"
        });
        assert!(ledger_terms_changed(&started, &patch));

        let unstarted = json!({
            "monthly_rent": 1000.0,
            "lease_date": "2024-01-01",
            "lease_start_date": null
        });
        assert!(!ledger_terms_changed(&unstarted, &patch));

        let mut merged = map(started);
        merged.extend(patch);
        assert_eq!(record_date(&merged, "lease_start_date"), None);
    }

    #[test]
    fn cleared_end_date_no_longer_bounds_the_start() {
        let payload: UpdateLeaseInput = serde_json::from_value(json!({
            "lease_start_date": "2024-06-01",
            "lease_end_date": null
        }))
        .expect("valid payload");
        let mut merged = map(json!({
            "lease_date": "2024-01-01",
            "lease_start_date": "2024-01-01",
            "lease_end_date": "2024-03-01"
        }));
        merged.extend(patch_map(&payload, &payload.cleared_fields()));

        assert_eq!(record_date(&merged, "lease_end_date"), None);
        assert!(validate_lease_dates(
            date(2024, 1, 1),
            record_date(&merged, "lease_start_date"),
            record_date(&merged, "lease_end_date"),
            date(2024, 7, 1),
        )
        .is_ok());
    }
}
