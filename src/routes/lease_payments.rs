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
    ledger::NewLeasePayment,
    repository::table_service::{delete_row, get_row, list_rows, update_row},
    routes::common::{
        db_pool, ensure_references, id_references, trim_text_fields, value_date, value_f64,
        value_str, Reference,
    },
    schemas::{
        clamp_limit, patch_map, validate_input, CreateLeasePaymentInput, LeasePaymentPath,
        LeasePaymentsQuery, UpdateLeasePaymentInput,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/lease-payments",
            axum::routing::get(list_lease_payments).post(create_lease_payment),
        )
        .route(
            "/lease-payments/{payment_id}",
            axum::routing::get(get_lease_payment)
                .patch(update_lease_payment)
                .delete(delete_lease_payment),
        )
}

async fn list_lease_payments(
    State(state): State<AppState>,
    Query(query): Query<LeasePaymentsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut payment_filters = Map::new();
    if let Some(lease_id) = query.lease_id.as_deref().map(str::trim) {
        if !lease_id.is_empty() {
            payment_filters.insert("lease_id".to_string(), json!(lease_id));
        }
    }

    let rows = list_rows(
        pool,
        "lease_payments",
        Some(&payment_filters),
        clamp_limit(query.limit),
        query.offset,
        "payment_date",
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_lease_payment(
    State(state): State<AppState>,
    Json(payload): Json<CreateLeasePaymentInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    validate_payment_dates(
        payload.payment_date,
        payload.payment_due_date,
        state.ledger.today(),
    )?;
    let pool = db_pool(&state)?;
    let lease_id = payload.lease_id.trim();
    ensure_references(
        pool,
        payment_references(
            Some(lease_id),
            Some(payload.payment_type_id),
            Some(payload.payment_category_id),
        ),
    )
    .await?;

    let payment = NewLeasePayment {
        lease_id: lease_id.to_string(),
        payment_type_id: payload.payment_type_id,
        payment_category_id: payload.payment_category_id,
        payment_date: payload.payment_date,
        payment_amount: payload.payment_amount,
        payment_due_date: payload.payment_due_date,
        notes: payload
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|notes| !notes.is_empty())
            .map(ToOwned::to_owned),
    };
    let stored = state.ledger.record_payment(payment).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn get_lease_payment(
    State(state): State<AppState>,
    Path(path): Path<LeasePaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "lease_payments", "id", &json!(path.payment_id)).await?;
    Ok(Json(record))
}

async fn update_lease_payment(
    State(state): State<AppState>,
    Path(path): Path<LeasePaymentPath>,
    Json(payload): Json<UpdateLeasePaymentInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let pool = db_pool(&state)?;
    let key = json!(path.payment_id);

    let existing = get_row(pool, "lease_payments", "id", &key).await?;
    let mut patch = patch_map(&payload, &payload.cleared_fields());
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }

    let payment_date = payload
        .payment_date
        .or_else(|| value_date(&existing, "payment_date"))
        .ok_or_else(|| AppError::Internal("Lease payment has no payment_date.".to_string()))?;
    let due_date = match payload.payment_due_date {
        Some(due_date) => due_date,
        None => value_date(&existing, "payment_due_date"),
    };
    validate_payment_dates(payment_date, due_date, state.ledger.today())?;
    ensure_references(
        pool,
        payment_references(None, payload.payment_type_id, payload.payment_category_id),
    )
    .await?;

    let updated = update_row(pool, "lease_payments", "id", &key, &patch).await?;

    if !moves_ledger(&existing, &payload) {
        return Ok(Json(updated));
    }
    let lease_id = value_str(&existing, "lease_id");
    state.ledger.refresh_ledger(&lease_id, "payment updated").await;
    // Running totals changed under the rebuild; return the rewritten row.
    let refreshed = get_row(pool, "lease_payments", "id", &key).await?;
    Ok(Json(refreshed))
}

async fn delete_lease_payment(
    State(state): State<AppState>,
    Path(path): Path<LeasePaymentPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "lease_payments", "id", &json!(path.payment_id)).await?;

    let lease_id = value_str(&deleted, "lease_id");
    tracing::info!(payment_id = path.payment_id, lease_id = %lease_id, "Lease payment deleted");
    state.ledger.on_payment_deleted(&lease_id).await;
    Ok(Json(deleted))
}

/// The lease a payment is filed under comes first: a missing lease is a
/// 404 no matter what else is wrong with the payload.
fn payment_references(
    lease_id: Option<&str>,
    payment_type_id: Option<i64>,
    payment_category_id: Option<i64>,
) -> Vec<Reference> {
    let mut references: Vec<Reference> = lease_id
        .map(|lease_id| Reference::lease(lease_id).owner())
        .into_iter()
        .collect();
    references.extend(id_references([
        ("payment_types", "Payment type", payment_type_id),
        ("payment_categories", "Payment category", payment_category_id),
    ]));
    references
}

fn validate_payment_dates(
    payment_date: NaiveDate,
    due_date: Option<NaiveDate>,
    today: NaiveDate,
) -> AppResult<()> {
    if payment_date > today {
        return Err(AppError::BadRequest(
            "Payment date cannot be in the future.".to_string(),
        ));
    }
    if due_date.is_some_and(|due| due < payment_date) {
        return Err(AppError::BadRequest(
            "Payment due date must be on or after the payment date.".to_string(),
        ));
    }
    Ok(())
}

/// Amount and date decide running totals; other edits leave the ledger alone.
fn moves_ledger(existing: &Value, payload: &UpdateLeasePaymentInput) -> bool {
    let amount_changed = payload
        .payment_amount
        .is_some_and(|amount| value_f64(existing, "payment_amount") != Some(amount));
    let date_changed = payload
        .payment_date
        .is_some_and(|date| value_date(existing, "payment_date") != Some(date));
    amount_changed || date_changed
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    use super::{moves_ledger, payment_references, validate_payment_dates};
    use crate::error::AppError;
    use crate::routes::common::value_date;
    use crate::schemas::{patch_map, UpdateLeasePaymentInput};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn empty_update() -> UpdateLeasePaymentInput {
        UpdateLeasePaymentInput {
            payment_type_id: None,
            payment_category_id: None,
            payment_date: None,
            payment_amount: None,
            payment_due_date: None,
            notes: None,
        }
    }

    #[test]
    fn payment_dates_are_checked() {
        let today = date(2024, 3, 15);
        assert!(validate_payment_dates(date(2024, 3, 15), None, today).is_ok());
        assert!(matches!(
            validate_payment_dates(date(2024, 3, 16), None, today),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            validate_payment_dates(date(2024, 3, 10), Some(date(2024, 3, 9)), today),
            Err(AppError::BadRequest(_))
        ));
        assert!(validate_payment_dates(date(2024, 3, 10), Some(date(2024, 3, 10)), today).is_ok());
    }

    #[test]
    fn only_amount_or_date_moves_the_ledger() {
        let existing = json!({
            "id": 501,
            "lease_id": "L-1",
            "payment_date": "2024-02-01",
            "payment_amount": 500.0,
            "notes": null
        });
        assert_eq!(value_date(&existing, "payment_date"), Some(date(2024, 2, 1)));

        let mut notes_only = empty_update();
        notes_only.notes = Some("paid by check".to_string());
        assert!(!moves_ledger(&existing, &notes_only));

        let mut same_amount = empty_update();
        same_amount.payment_amount = Some(500.0);
        assert!(!moves_ledger(&existing, &same_amount));

        let mut new_amount = empty_update();
        new_amount.payment_amount = Some(650.0);
        assert!(moves_ledger(&existing, &new_amount));

        let mut new_date = empty_update();
        new_date.payment_date = Some(date(2024, 2, 3));
        assert!(moves_ledger(&existing, &new_date));
    }

    #[test]
    fn lease_is_checked_before_lookups() {
        let references = payment_references(Some("L-404"), Some(600), Some(1100));
        let tables: Vec<&str> = references.iter().map(|reference| reference.table).collect();
        assert_eq!(tables, vec!["leases", "payment_types", "payment_categories"]);
        assert!(references[0].owner);
        assert!(references[1..].iter().all(|reference| !reference.owner));

        let update_only = payment_references(None, Some(600), None);
        assert_eq!(update_only.len(), 1);
        assert_eq!(update_only[0].table, "payment_types");
    }

    #[test]
    fn due_date_can_be_cleared() {
        let cleared: UpdateLeasePaymentInput =
            serde_json::from_value(json!({ "payment_due_date": null })).expect("valid payload");
        assert_eq!(cleared.payment_due_date, Some(None));
        let patch = patch_map(&cleared, &cleared.cleared_fields());
        assert_eq!(patch.get("payment_due_date"), Some(&Value::Null));

        let untouched: UpdateLeasePaymentInput =
            serde_json::from_value(json!({ "notes": "late" })).expect("valid payload");
        assert_eq!(untouched.payment_due_date, None);
        let patch = patch_map(&untouched, &untouched.cleared_fields());
        assert!(!patch.contains_key("payment_due_date"));

        let moved: UpdateLeasePaymentInput =
            serde_json::from_value(json!({ "payment_due_date": "2024-04-01" }))
                .expect("valid payload");
        assert_eq!(moved.payment_due_date, Some(Some(date(2024, 4, 1))));
        assert_eq!(
            patch_map(&moved, &moved.cleared_fields()).get("payment_due_date"),
            Some(&json!("2024-04-01"))
        );
    }
}
