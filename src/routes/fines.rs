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
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::common::{
        db_pool, ensure_not_future, ensure_references, ensure_unique, filters, id_references,
        record_date, trim_text_fields, value_str, Reference,
    },
    schemas::{
        clamp_limit, patch_map, remove_nulls, serialize_to_map, validate_input, CreateFineInput,
        FinePath, PropertyRecordsQuery, UpdateFineInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/fines", axum::routing::get(list_fines).post(create_fine))
        .route(
            "/fines/{fine_id}",
            axum::routing::get(get_fine)
                .patch(update_fine)
                .delete(delete_fine),
        )
}

async fn list_fines(
    State(state): State<AppState>,
    Query(query): Query<PropertyRecordsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut fine_filters = Map::new();
    if let Some(property_id) = query.property_id {
        fine_filters.insert("property_id".to_string(), json!(property_id));
    }

    let rows = list_rows(
        pool,
        "fines",
        Some(&fine_filters),
        clamp_limit(query.limit),
        query.offset,
        "fine_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_fine(
    State(state): State<AppState>,
    Json(payload): Json<CreateFineInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    let fine_id = payload.fine_id.trim();
    check_fine_id(fine_id)?;
    validate_fine_dates(payload.fine_date, payload.fine_due_date, state.ledger.today())?;
    let pool = db_pool(&state)?;

    ensure_unique(
        pool,
        "fines",
        filters([("fine_id", json!(fine_id))]),
        None,
        &format!("Fine with ID {fine_id} already exists."),
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    ensure_fine_references(pool, &record, true).await?;

    let created = create_row(pool, "fines", &record).await?;
    tracing::info!(
        fine_id,
        property_id = payload.property_id,
        amount = payload.fine_amount,
        "Fine issued"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_fine(
    State(state): State<AppState>,
    Path(path): Path<FinePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "fines", "fine_id", &json!(path.fine_id)).await?;
    Ok(Json(record))
}

async fn update_fine(
    State(state): State<AppState>,
    Path(path): Path<FinePath>,
    Json(payload): Json<UpdateFineInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = patch_map(&payload, &payload.cleared_fields());
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let pool = db_pool(&state)?;
    let key = json!(path.fine_id);

    let existing = get_row(pool, "fines", "fine_id", &key).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());

    if patch.contains_key("fine_date") || patch.contains_key("fine_due_date") {
        let fine_date = record_date(&merged, "fine_date")
            .ok_or_else(|| AppError::Internal("Fine record has no fine_date.".to_string()))?;
        let due_date = record_date(&merged, "fine_due_date")
            .ok_or_else(|| AppError::Internal("Fine record has no fine_due_date.".to_string()))?;
        validate_fine_dates(fine_date, due_date, state.ledger.today())?;
    }
    ensure_fine_references(pool, &patch, false).await?;
    if patch.contains_key("lease_id") || patch.contains_key("property_id") {
        check_lease_placement(pool, &merged).await?;
    }

    let updated = update_row(pool, "fines", "fine_id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_fine(
    State(state): State<AppState>,
    Path(path): Path<FinePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "fines", "fine_id", &json!(path.fine_id)).await?;
    tracing::info!(fine_id = %path.fine_id, "Fine deleted");
    Ok(Json(deleted))
}

/// Letters, digits and dashes only.
fn check_fine_id(fine_id: &str) -> AppResult<()> {
    let valid = !fine_id.is_empty()
        && fine_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-');
    if valid {
        return Ok(());
    }
    Err(AppError::BadRequest(
        "Fine ID may only contain letters, digits and dashes.".to_string(),
    ))
}

fn validate_fine_dates(fine_date: NaiveDate, due_date: NaiveDate, today: NaiveDate) -> AppResult<()> {
    ensure_not_future(fine_date, today, "Fine date")?;
    if due_date < fine_date {
        return Err(AppError::BadRequest(
            "Fine due date must be on or after the fine date.".to_string(),
        ));
    }
    Ok(())
}

fn fine_references(record: &Map<String, Value>) -> Vec<Reference> {
    let id = |column: &str| record.get(column).and_then(Value::as_i64);
    let mut references = id_references([("properties", "Property", id("property_id"))]);
    if let Some(lease_id) = record.get("lease_id").and_then(Value::as_str) {
        references.push(Reference::lease(lease_id));
    }
    references.extend(id_references([
        ("fine_types", "Fine type", id("fine_type_id")),
        ("payment_types", "Payment type", id("payment_type_id")),
        ("payment_categories", "Payment category", id("payment_category_id")),
    ]));
    references
}

async fn ensure_fine_references(
    pool: &sqlx::PgPool,
    record: &Map<String, Value>,
    creating: bool,
) -> AppResult<()> {
    ensure_references(pool, fine_references(record)).await?;
    if creating {
        check_lease_placement(pool, record).await?;
    }
    Ok(())
}

/// A fine charged to a lease must be on that lease's property.
async fn check_lease_placement(pool: &sqlx::PgPool, record: &Map<String, Value>) -> AppResult<()> {
    let Some(lease_id) = record.get("lease_id").and_then(Value::as_str) else {
        return Ok(());
    };
    let property_id = record
        .get("property_id")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    let lease = get_row(pool, "leases", "lease_id", &json!(lease_id)).await?;
    check_lease_property(&lease, property_id)
}

fn check_lease_property(lease: &Value, property_id: i64) -> AppResult<()> {
    if lease.get("property_id").and_then(Value::as_i64) == Some(property_id) {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "Lease {} is not on property {property_id}.",
        value_str(lease, "lease_id")
    )))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::{check_fine_id, check_lease_property, fine_references, validate_fine_dates};
    use crate::error::AppError;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn fine_ids_are_alphanumeric_with_dashes() {
        assert!(check_fine_id("F-2024-001").is_ok());
        assert!(matches!(check_fine_id("F 1"), Err(AppError::BadRequest(_))));
        assert!(matches!(check_fine_id("F_1"), Err(AppError::BadRequest(_))));
        assert!(check_fine_id("").is_err());
    }

    #[test]
    fn due_date_cannot_precede_fine_date() {
        let today = date(2024, 5, 1);
        assert!(validate_fine_dates(date(2024, 4, 1), date(2024, 4, 15), today).is_ok());
        assert!(validate_fine_dates(date(2024, 4, 1), date(2024, 4, 1), today).is_ok());
        assert!(matches!(
            validate_fine_dates(date(2024, 4, 10), date(2024, 4, 9), today),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_fine_dates(date(2024, 5, 2), date(2024, 6, 1), today),
            Err(AppError::BadRequest(ref message)) if message == "Fine date cannot be in the future."
        ));
    }

    #[test]
    fn references_follow_the_record() {
        let record = map(json!({
            "fine_id": "F-1",
            "property_id": 700,
            "lease_id": "L-1",
            "fine_type_id": 200,
            "payment_type_id": 600,
            "payment_category_id": 1100
        }));
        let tables: Vec<&str> = fine_references(&record)
            .iter()
            .map(|reference| reference.table)
            .collect();
        assert_eq!(
            tables,
            vec!["properties", "leases", "fine_types", "payment_types", "payment_categories"]
        );

        let patch = map(json!({ "lease_id": null, "notes": "waived" }));
        assert!(fine_references(&patch).is_empty());
    }

    #[test]
    fn lease_must_be_on_the_property() {
        let lease = json!({ "lease_id": "L-1", "property_id": 700 });
        assert!(check_lease_property(&lease, 700).is_ok());
        assert!(matches!(
            check_lease_property(&lease, 701),
            Err(AppError::BadRequest(_))
        ));
    }
}
