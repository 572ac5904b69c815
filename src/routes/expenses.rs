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
        db_pool, ensure_not_future, ensure_references, ensure_unique, id_references,
        match_filters, trim_text_fields, Reference,
    },
    schemas::{
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreateExpenseInput,
        ExpensePath, PropertyRecordsQuery, UpdateExpenseInput,
    },
    state::AppState,
};

/// Two expenses matching on all of these are the same expense entered twice.
const IDENTITY: &[&str] = &[
    "property_id",
    "expense_date",
    "payment_category_id",
    "payment_type_id",
    "expense_amount",
];

const DUPLICATE_EXPENSE: &str = "An expense with the same property, date, payment type, \
     category and amount already exists.";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/expenses",
            axum::routing::get(list_expenses).post(create_expense),
        )
        .route(
            "/expenses/{expense_id}",
            axum::routing::get(get_expense)
                .patch(update_expense)
                .delete(delete_expense),
        )
}

async fn list_expenses(
    State(state): State<AppState>,
    Query(query): Query<PropertyRecordsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut expense_filters = Map::new();
    if let Some(property_id) = query.property_id {
        expense_filters.insert("property_id".to_string(), json!(property_id));
    }

    let rows = list_rows(
        pool,
        "expenses",
        Some(&expense_filters),
        clamp_limit(query.limit),
        query.offset,
        "expense_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_expense(
    State(state): State<AppState>,
    Json(payload): Json<CreateExpenseInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    ensure_not_future(payload.expense_date, state.ledger.today(), "Expense date")?;
    let pool = db_pool(&state)?;

    ensure_references(
        pool,
        expense_references(
            Some(payload.property_id),
            Some(payload.expense_type_id),
            Some(payload.payment_type_id),
            Some(payload.payment_category_id),
        ),
    )
    .await?;

    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    ensure_unique(
        pool,
        "expenses",
        match_filters(&record, IDENTITY),
        None,
        DUPLICATE_EXPENSE,
    )
    .await?;

    let created = create_row(pool, "expenses", &record).await?;
    tracing::info!(
        expense_id = %created["id"],
        property_id = payload.property_id,
        amount = payload.expense_amount,
        "Expense recorded"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "expenses", "id", &json!(path.expense_id)).await?;
    Ok(Json(record))
}

async fn update_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
    Json(payload): Json<UpdateExpenseInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    if let Some(expense_date) = payload.expense_date {
        ensure_not_future(expense_date, state.ledger.today(), "Expense date")?;
    }
    let pool = db_pool(&state)?;
    let key = json!(path.expense_id);

    let existing = get_row(pool, "expenses", "id", &key).await?;
    ensure_references(
        pool,
        expense_references(
            payload.property_id,
            payload.expense_type_id,
            payload.payment_type_id,
            payload.payment_category_id,
        ),
    )
    .await?;

    if IDENTITY.iter().any(|column| patch.contains_key(*column)) {
        let mut merged = existing.as_object().cloned().unwrap_or_default();
        merged.extend(patch.clone());
        ensure_unique(
            pool,
            "expenses",
            match_filters(&merged, IDENTITY),
            Some(key.clone()),
            DUPLICATE_EXPENSE,
        )
        .await?;
    }

    let updated = update_row(pool, "expenses", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_expense(
    State(state): State<AppState>,
    Path(path): Path<ExpensePath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "expenses", "id", &json!(path.expense_id)).await?;
    Ok(Json(deleted))
}

fn expense_references(
    property_id: Option<i64>,
    expense_type_id: Option<i64>,
    payment_type_id: Option<i64>,
    payment_category_id: Option<i64>,
) -> Vec<Reference> {
    id_references([
        ("properties", "Property", property_id),
        ("expense_types", "Expense type", expense_type_id),
        ("payment_types", "Payment type", payment_type_id),
        ("payment_categories", "Payment category", payment_category_id),
    ])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{expense_references, IDENTITY};
    use crate::routes::common::match_filters;
    use crate::schemas::{remove_nulls, serialize_to_map, CreateExpenseInput};

    #[test]
    fn expense_references_cover_every_lookup() {
        let tables: Vec<&str> = expense_references(Some(700), Some(100), Some(600), Some(1100))
            .iter()
            .map(|reference| reference.table)
            .collect();
        assert_eq!(
            tables,
            vec!["properties", "expense_types", "payment_types", "payment_categories"]
        );
        assert_eq!(expense_references(None, Some(101), None, None).len(), 1);
    }

    #[test]
    fn duplicate_check_ignores_notes_and_check_number() {
        let input: CreateExpenseInput = serde_json::from_value(json!({
            "property_id": 700,
            "expense_type_id": 100,
            "expense_date": "2024-03-01",
            "expense_amount": 125.75,
            "payment_type_id": 600,
            "payment_category_id": 1100,
            "check_number": 1042,
            "notes": "Gutter repair"
        }))
        .expect("valid payload");
        let record = remove_nulls(serialize_to_map(&input));
        let identity = match_filters(&record, IDENTITY);

        assert_eq!(identity.len(), 5);
        assert_eq!(identity.get("expense_date"), Some(&json!("2024-03-01")));
        assert_eq!(identity.get("expense_amount"), Some(&json!(125.75)));
        assert!(!identity.contains_key("check_number"));
    }
}
