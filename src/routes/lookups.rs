//! CRUD shared by the lookup tables (payment, expense, fine, inspection and
//! utility types). Each table names the columns that identify a row; those
//! are required on create and unique together regardless of case.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    repository::table_service::{create_row, delete_row, get_row, list_rows, update_row},
    routes::common::{
        db_pool, ensure_not_referenced, ensure_unique, ieq_filters, trim_text_fields,
    },
    schemas::{clamp_limit, remove_nulls, serialize_to_map, validate_input, PageQuery},
    state::AppState,
};

#[derive(Debug)]
pub struct LookupTable {
    pub table: &'static str,
    pub collection_path: &'static str,
    pub item_path: &'static str,
    pub label: &'static str,
    pub identity: &'static [&'static str],
    /// `(table, column)` pairs that point at this lookup and block deletion.
    pub referenced_by: &'static [(&'static str, &'static str)],
}

impl LookupTable {
    /// Validated, trimmed columns of `payload`. Identity columns must be
    /// present when `creating` and may never be blank.
    pub fn record<T>(&self, payload: &T, creating: bool) -> AppResult<Map<String, Value>>
    where
        T: Serialize + Validate,
    {
        validate_input(payload)?;
        let mut record = remove_nulls(serialize_to_map(payload));
        trim_text_fields(&mut record);

        for column in self.identity {
            match record.get(*column).and_then(Value::as_str) {
                Some("") => {
                    return Err(AppError::BadRequest(format!("{column} cannot be empty.")));
                }
                None if creating => {
                    return Err(AppError::BadRequest(format!("{column} is required.")));
                }
                _ => {}
            }
        }
        Ok(record)
    }

    pub(crate) fn duplicate_message(&self, record: &Map<String, Value>) -> String {
        let names: Vec<&str> = self
            .identity
            .iter()
            .filter_map(|column| record.get(*column).and_then(Value::as_str))
            .collect();
        format!("{} '{}' already exists.", self.label, names.join(" / "))
    }

    async fn ensure_identity_free(
        &self,
        pool: &sqlx::PgPool,
        record: &Map<String, Value>,
        exclude_id: Option<Value>,
    ) -> AppResult<()> {
        ensure_unique(
            pool,
            self.table,
            ieq_filters(record, self.identity),
            exclude_id,
            &self.duplicate_message(record),
        )
        .await
    }
}

pub fn lookup_router<T>(lookup: &'static LookupTable) -> Router<AppState>
where
    T: DeserializeOwned + Serialize + Validate + Send + 'static,
{
    Router::new()
        .route(
            lookup.collection_path,
            get(
                move |State(state): State<AppState>, Query(query): Query<PageQuery>| {
                    list_lookups(lookup, state, query)
                },
            )
            .post(
                move |State(state): State<AppState>, Json(payload): Json<T>| {
                    create_lookup(lookup, state, payload)
                },
            ),
        )
        .route(
            lookup.item_path,
            get(move |State(state): State<AppState>, Path(id): Path<i64>| {
                get_lookup(lookup, state, id)
            })
            .patch(
                move |State(state): State<AppState>, Path(id): Path<i64>, Json(payload): Json<T>| {
                    update_lookup(lookup, state, id, payload)
                },
            )
            .delete(move |State(state): State<AppState>, Path(id): Path<i64>| {
                delete_lookup(lookup, state, id)
            }),
        )
}

async fn list_lookups(
    lookup: &'static LookupTable,
    state: AppState,
    query: PageQuery,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let order_by = lookup.identity.first().copied().unwrap_or("id");
    let rows = list_rows(
        pool,
        lookup.table,
        None,
        clamp_limit(query.limit),
        query.offset,
        order_by,
        true,
    )
    .await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_lookup<T>(
    lookup: &'static LookupTable,
    state: AppState,
    payload: T,
) -> AppResult<(StatusCode, Json<Value>)>
where
    T: Serialize + Validate,
{
    let record = lookup.record(&payload, true)?;
    let pool = db_pool(&state)?;
    lookup.ensure_identity_free(pool, &record, None).await?;

    let created = create_row(pool, lookup.table, &record).await?;
    tracing::info!(table = lookup.table, id = %created["id"], "Lookup created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_lookup(lookup: &'static LookupTable, state: AppState, id: i64) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let record = get_row(pool, lookup.table, "id", &json!(id)).await?;
    Ok(Json(record))
}

async fn update_lookup<T>(
    lookup: &'static LookupTable,
    state: AppState,
    id: i64,
    payload: T,
) -> AppResult<Json<Value>>
where
    T: Serialize + Validate,
{
    let patch = lookup.record(&payload, false)?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let pool = db_pool(&state)?;
    let key = json!(id);
    let existing = get_row(pool, lookup.table, "id", &key).await?;

    if lookup.identity.iter().any(|column| patch.contains_key(*column)) {
        let mut merged = existing.as_object().cloned().unwrap_or_default();
        merged.extend(patch.clone());
        lookup
            .ensure_identity_free(pool, &merged, Some(key.clone()))
            .await?;
    }

    let updated = update_row(pool, lookup.table, "id", &key, &patch).await?;
    Ok(Json(updated))
}

async fn delete_lookup(
    lookup: &'static LookupTable,
    state: AppState,
    id: i64,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let key = json!(id);
    get_row(pool, lookup.table, "id", &key).await?;
    ensure_not_referenced(
        pool,
        lookup.referenced_by,
        &key,
        &format!("{} {id} is in use and cannot be deleted.", lookup.label),
    )
    .await?;

    let deleted = delete_row(pool, lookup.table, "id", &key).await?;
    tracing::info!(table = lookup.table, id, "Lookup deleted");
    Ok(Json(deleted))
}
