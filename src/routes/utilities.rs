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
        db_pool, ensure_not_future, ensure_references, ensure_unique, id_references,
        match_filters, record_date, trim_text_fields, Reference,
    },
    schemas::{
        clamp_limit, patch_map, remove_nulls, serialize_to_map, validate_input,
        CreateUtilityInput, PropertyRecordsQuery, UpdateUtilityInput, UtilityPath,
    },
    state::AppState,
};

/// The same bill for the same utility paid twice.
const IDENTITY: &[&str] = &["property_id", "utility_type_id", "amount", "payment_date"];

const DUPLICATE_UTILITY: &str =
    "A utility payment with the same property, utility type, amount and date already exists.";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/utilities",
            axum::routing::get(list_utilities).post(create_utility),
        )
        .route(
            "/utilities/{utility_id}",
            axum::routing::get(get_utility)
                .patch(update_utility)
                .delete(delete_utility),
        )
}

async fn list_utilities(
    State(state): State<AppState>,
    Query(query): Query<PropertyRecordsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut utility_filters = Map::new();
    if let Some(property_id) = query.property_id {
        utility_filters.insert("property_id".to_string(), json!(property_id));
    }

    let rows = list_rows(
        pool,
        "utilities",
        Some(&utility_filters),
        clamp_limit(query.limit),
        query.offset,
        "payment_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_utility(
    State(state): State<AppState>,
    Json(payload): Json<CreateUtilityInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    validate_utility_dates(payload.reading_date, payload.payment_date, state.ledger.today())?;
    let pool = db_pool(&state)?;

    ensure_references(
        pool,
        utility_references(
            Some(payload.property_id),
            Some(payload.utility_type_id),
            Some(payload.payment_type_id),
            Some(payload.payment_category_id),
        ),
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    ensure_unique(
        pool,
        "utilities",
        match_filters(&record, IDENTITY),
        None,
        DUPLICATE_UTILITY,
    )
    .await?;

    let created = create_row(pool, "utilities", &record).await?;
    tracing::info!(
        utility_id = %created["id"],
        property_id = payload.property_id,
        amount = payload.amount,
        "Utility payment recorded"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_utility(
    State(state): State<AppState>,
    Path(path): Path<UtilityPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "utilities", "id", &json!(path.utility_id)).await?;
    Ok(Json(record))
}

async fn update_utility(
    State(state): State<AppState>,
    Path(path): Path<UtilityPath>,
    Json(payload): Json<UpdateUtilityInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = patch_map(&payload, &payload.cleared_fields());
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let pool = db_pool(&state)?;
    let key = json!(path.utility_id);

    let existing = get_row(pool, "utilities", "id", &key).await?;
    let mut merged = existing.as_object().cloned().unwrap_or_default();
    merged.extend(patch.clone());

    if patch.contains_key("reading_date") || patch.contains_key("payment_date") {
        let payment_date = record_date(&merged, "payment_date").ok_or_else(|| {
            AppError::Internal("Utility record has no payment_date.".to_string())
        })?;
        validate_utility_dates(
            record_date(&merged, "reading_date"),
            payment_date,
            state.ledger.today(),
        )?;
    }
    ensure_references(
        pool,
        utility_references(
            payload.property_id,
            payload.utility_type_id,
            payload.payment_type_id,
            payload.payment_category_id,
        ),
    )
    .await?;

    if IDENTITY.iter().any(|column| patch.contains_key(*column)) {
        ensure_unique(
            pool,
            "utilities",
            match_filters(&merged, IDENTITY),
            Some(key.clone()),
            DUPLICATE_UTILITY,
        )
        .await?;
    }

    let updated = update_row(pool, "utilities", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_utility(
    State(state): State<AppState>,
    Path(path): Path<UtilityPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "utilities", "id", &json!(path.utility_id)).await?;
    Ok(Json(deleted))
}

/// A meter is read before the bill it produces is paid.
fn validate_utility_dates(
    reading_date: Option<NaiveDate>,
    payment_date: NaiveDate,
    today: NaiveDate,
) -> AppResult<()> {
    ensure_not_future(payment_date, today, "Payment date")?;
    if let Some(reading_date) = reading_date {
        ensure_not_future(reading_date, today, "Reading date")?;
        if reading_date > payment_date {
            return Err(AppError::BadRequest(
                "Reading date must be on or before the payment date.".to_string(),
            ));
        }
    }
    Ok(())
}

fn utility_references(
    property_id: Option<i64>,
    utility_type_id: Option<i64>,
    payment_type_id: Option<i64>,
    payment_category_id: Option<i64>,
) -> Vec<Reference> {
    id_references([
        ("properties", "Property", property_id),
        ("utility_types", "Utility type", utility_type_id),
        ("payment_types", "Payment type", payment_type_id),
        ("payment_categories", "Payment category", payment_category_id),
    ])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use super::{utility_references, validate_utility_dates};
    use crate::error::AppError;
    use crate::schemas::{patch_map, UpdateUtilityInput};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn reading_precedes_payment() {
        let today = date(2024, 6, 1);
        assert!(validate_utility_dates(None, date(2024, 5, 20), today).is_ok());
        assert!(validate_utility_dates(Some(date(2024, 5, 1)), date(2024, 5, 20), today).is_ok());
        assert!(matches!(
            validate_utility_dates(Some(date(2024, 5, 21)), date(2024, 5, 20), today),
            Err(AppError::BadRequest(ref message)) if message.starts_with("Reading date must")
        ));
        assert!(matches!(
            validate_utility_dates(None, date(2024, 6, 2), today),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn reading_date_can_be_cleared() {
        let payload: UpdateUtilityInput =
            serde_json::from_value(json!({ "reading_date": null })).expect("valid payload");
        let patch = patch_map(&payload, &payload.cleared_fields());
        assert_eq!(patch.get("reading_date"), Some(&Value::Null));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn every_lookup_is_referenced() {
        assert_eq!(utility_references(Some(700), Some(1000), Some(600), Some(1100)).len(), 4);
        assert!(utility_references(None, None, None, None).is_empty());
    }
}
