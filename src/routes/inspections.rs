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
        clamp_limit, remove_nulls, serialize_to_map, validate_input, CreateInspectionInput,
        InspectionPath, PropertyRecordsQuery, UpdateInspectionInput,
    },
    state::AppState,
};

/// One inspection per property per day.
const IDENTITY: &[&str] = &["property_id", "inspection_date"];

const DUPLICATE_INSPECTION: &str = "An inspection for this property on this date already exists.";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/inspections",
            axum::routing::get(list_inspections).post(create_inspection),
        )
        .route(
            "/inspections/{inspection_id}",
            axum::routing::get(get_inspection)
                .patch(update_inspection)
                .delete(delete_inspection),
        )
}

async fn list_inspections(
    State(state): State<AppState>,
    Query(query): Query<PropertyRecordsQuery>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;

    let mut inspection_filters = Map::new();
    if let Some(property_id) = query.property_id {
        inspection_filters.insert("property_id".to_string(), json!(property_id));
    }

    let rows = list_rows(
        pool,
        "inspections",
        Some(&inspection_filters),
        clamp_limit(query.limit),
        query.offset,
        "inspection_date",
        false,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_inspection(
    State(state): State<AppState>,
    Json(payload): Json<CreateInspectionInput>,
) -> AppResult<impl IntoResponse> {
    validate_input(&payload)?;
    ensure_not_future(payload.inspection_date, state.ledger.today(), "Inspection date")?;
    let mut record = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut record);
    check_inspector(&record)?;
    let pool = db_pool(&state)?;

    ensure_references(
        pool,
        inspection_references(
            Some(payload.property_id),
            Some(payload.inspection_type_id),
            payload.payment_type_id,
        ),
    )
    .await?;
    ensure_unique(
        pool,
        "inspections",
        match_filters(&record, IDENTITY),
        None,
        DUPLICATE_INSPECTION,
    )
    .await?;

    let created = create_row(pool, "inspections", &record).await?;
    tracing::info!(
        inspection_id = %created["id"],
        property_id = payload.property_id,
        "Inspection recorded"
    );
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_inspection(
    State(state): State<AppState>,
    Path(path): Path<InspectionPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, "inspections", "id", &json!(path.inspection_id)).await?;
    Ok(Json(record))
}

async fn update_inspection(
    State(state): State<AppState>,
    Path(path): Path<InspectionPath>,
    Json(payload): Json<UpdateInspectionInput>,
) -> AppResult<Json<Value>> {
    validate_input(&payload)?;
    let mut patch = remove_nulls(serialize_to_map(&payload));
    trim_text_fields(&mut patch);
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    check_inspector(&patch)?;
    if let Some(inspection_date) = payload.inspection_date {
        ensure_not_future(inspection_date, state.ledger.today(), "Inspection date")?;
    }
    let pool = db_pool(&state)?;
    let key = json!(path.inspection_id);

    let existing = get_row(pool, "inspections", "id", &key).await?;
    ensure_references(
        pool,
        inspection_references(
            payload.property_id,
            payload.inspection_type_id,
            payload.payment_type_id,
        ),
    )
    .await?;

    if IDENTITY.iter().any(|column| patch.contains_key(*column)) {
        let mut merged = existing.as_object().cloned().unwrap_or_default();
        merged.extend(patch.clone());
        ensure_unique(
            pool,
            "inspections",
            match_filters(&merged, IDENTITY),
            Some(key.clone()),
            DUPLICATE_INSPECTION,
        )
        .await?;
    }

    let updated = update_row(pool, "inspections", "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_inspection(
    State(state): State<AppState>,
    Path(path): Path<InspectionPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let deleted = delete_row(pool, "inspections", "id", &json!(path.inspection_id)).await?;
    Ok(Json(deleted))
}

fn check_inspector(record: &Map<String, Value>) -> AppResult<()> {
    if record.get("inspected_by").and_then(Value::as_str) == Some("") {
        return Err(AppError::BadRequest(
            "inspected_by cannot be empty.".to_string(),
        ));
    }
    Ok(())
}

fn inspection_references(
    property_id: Option<i64>,
    inspection_type_id: Option<i64>,
    payment_type_id: Option<i64>,
) -> Vec<Reference> {
    id_references([
        ("properties", "Property", property_id),
        ("inspection_types", "Inspection type", inspection_type_id),
        ("payment_types", "Payment type", payment_type_id),
    ])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{check_inspector, inspection_references};
    use crate::error::AppError;
    use crate::routes::common::trim_text_fields;

    #[test]
    fn payment_type_is_optional() {
        let references = inspection_references(Some(700), Some(400), None);
        let tables: Vec<&str> = references.iter().map(|reference| reference.table).collect();
        assert_eq!(tables, vec!["properties", "inspection_types"]);
    }

    #[test]
    fn blank_inspector_is_rejected() {
        let mut record = json!({ "inspected_by": "   " })
            .as_object()
            .cloned()
            .unwrap_or_default();
        trim_text_fields(&mut record);
        assert!(matches!(
            check_inspector(&record),
            Err(AppError::BadRequest(_))
        ));

        let named = json!({ "inspected_by": "J. Ortiz" })
            .as_object()
            .cloned()
            .unwrap_or_default();
        assert!(check_inspector(&named).is_ok());
    }
}
