use std::future::Future;

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::error::{AppError, AppResult};
use crate::repository::table_service::{count_rows, row_exists, Filters};
use crate::state::AppState;

pub fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

pub fn filters<const N: usize>(entries: [(&str, Value); N]) -> Filters {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub fn value_str(row: &Value, key: &str) -> String {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

pub fn value_f64(row: &Value, key: &str) -> Option<f64> {
    row.as_object()
        .and_then(|obj| obj.get(key))
        .and_then(Value::as_f64)
}

pub fn value_date(row: &Value, key: &str) -> Option<NaiveDate> {
    row.as_object().and_then(|record| record_date(record, key))
}

/// Date column of a JSON record; timestamps are cut to their date part.
pub fn record_date(record: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(|raw| raw.get(..10))
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
}

/// Exact match on each of `columns`, read from `record`.
pub fn match_filters(record: &Map<String, Value>, columns: &[&str]) -> Filters {
    columns
        .iter()
        .map(|column| {
            (
                (*column).to_string(),
                record.get(*column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

/// Case-insensitive match on each of `columns`, read from `record`.
pub fn ieq_filters(record: &Map<String, Value>, columns: &[&str]) -> Filters {
    columns
        .iter()
        .map(|column| {
            (
                format!("{column}__ieq"),
                record.get(*column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

pub fn trim_text_fields(map: &mut Map<String, Value>) {
    for value in map.values_mut() {
        if let Value::String(text) = value {
            let trimmed = text.trim();
            if trimmed.len() != text.len() {
                *text = trimmed.to_string();
            }
        }
    }
}

/// Fails with 400 when a referenced record does not exist.
pub async fn ensure_reference(
    pool: &sqlx::PgPool,
    table: &str,
    id_field: &str,
    key: Value,
    label: &str,
) -> AppResult<()> {
    let display = match &key {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    if row_exists(pool, table, &filters([(id_field, key)])).await? {
        return Ok(());
    }
    Err(AppError::BadRequest(format!(
        "{label} with ID {display} not found."
    )))
}

/// A row that must exist before a write goes through.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub table: &'static str,
    pub id_field: &'static str,
    pub key: Value,
    pub label: &'static str,
    /// The record the request is filed under. Its absence is a 404, any
    /// other missing reference is a 400.
    pub owner: bool,
}

impl Reference {
    pub fn by_id(table: &'static str, label: &'static str, id: i64) -> Self {
        Self {
            table,
            id_field: "id",
            key: json!(id),
            label,
            owner: false,
        }
    }

    pub fn lease(lease_id: &str) -> Self {
        Self {
            table: "leases",
            id_field: "lease_id",
            key: json!(lease_id),
            label: "Lease",
            owner: false,
        }
    }

    pub fn owner(mut self) -> Self {
        self.owner = true;
        self
    }

    fn missing(&self) -> AppError {
        let display = match &self.key {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let message = format!("{} with ID {display} not found.", self.label);
        if self.owner {
            AppError::NotFound(message)
        } else {
            AppError::BadRequest(message)
        }
    }
}

/// Id references that are set, in the order given.
pub fn id_references<const N: usize>(
    entries: [(&'static str, &'static str, Option<i64>); N],
) -> Vec<Reference> {
    entries
        .into_iter()
        .filter_map(|(table, label, id)| id.map(|id| Reference::by_id(table, label, id)))
        .collect()
}

/// Checks references in order and stops at the first missing one.
pub async fn check_references<F, Fut>(references: Vec<Reference>, exists: F) -> AppResult<()>
where
    F: Fn(&'static str, &'static str, Value) -> Fut,
    Fut: Future<Output = AppResult<bool>>,
{
    for reference in references {
        if !exists(reference.table, reference.id_field, reference.key.clone()).await? {
            return Err(reference.missing());
        }
    }
    Ok(())
}

pub async fn ensure_references(pool: &sqlx::PgPool, references: Vec<Reference>) -> AppResult<()> {
    check_references(references, move |table, id_field, key| async move {
        row_exists(pool, table, &filters([(id_field, key)])).await
    })
    .await
}

/// Fails with 400 while any `(table, column)` still points at `key`.
pub async fn ensure_not_referenced(
    pool: &sqlx::PgPool,
    referenced_by: &[(&str, &str)],
    key: &Value,
    message: &str,
) -> AppResult<()> {
    for (table, column) in referenced_by {
        let count = count_rows(pool, table, Some(&filters([(*column, key.clone())]))).await?;
        if count > 0 {
            return Err(AppError::BadRequest(message.to_string()));
        }
    }
    Ok(())
}

pub fn ensure_not_future(date: NaiveDate, today: NaiveDate, label: &str) -> AppResult<()> {
    if date > today {
        return Err(AppError::BadRequest(format!(
            "{label} cannot be in the future."
        )));
    }
    Ok(())
}

/// Fails with 409 when a row other than `exclude_id` already matches.
pub async fn ensure_unique(
    pool: &sqlx::PgPool,
    table: &str,
    mut matching: Filters,
    exclude_id: Option<Value>,
    message: &str,
) -> AppResult<()> {
    if let Some(id) = exclude_id {
        matching.insert("id__ne".to_string(), id);
    }
    if row_exists(pool, table, &matching).await? {
        return Err(AppError::Conflict(message.to_string()));
    }
    Ok(())
}
