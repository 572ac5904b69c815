use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "expense_types",
    "expenses",
    "fine_types",
    "fines",
    "inspection_types",
    "inspections",
    "lease_payments",
    "leases",
    "payment_categories",
    "payment_types",
    "properties",
    "residents",
    "units",
    "utilities",
    "utility_types",
];

/// Row filter keyed by column name. A `__ne` suffix negates the match and an
/// `__ieq` suffix compares case-insensitively; `null` matches `IS NULL`.
pub type Filters = Map<String, Value>;

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Filters>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "id"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = select_from(table_name);
    if let Some(filter_map) = filters {
        push_filters(&mut query, filter_map)?;
    }
    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    // Stable paging when the order column has ties.
    if order_name != "id" {
        query.push(", t.id ASC");
    }
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, 1000))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn find_row(
    pool: &sqlx::PgPool,
    table: &str,
    filters: &Filters,
) -> Result<Option<Value>, AppError> {
    let table_name = validate_table(table)?;
    let mut query = select_from(table_name);
    push_filters(&mut query, filters)?;
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;
    Ok(row.and_then(read_row))
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    id_field: &str,
    key: &Value,
) -> Result<Value, AppError> {
    let filters = key_filter(id_field, key)?;
    find_row(pool, table, &filters)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{table} record not found.")))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let mut query = build_insert(table, payload)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(read_row)
        .ok_or_else(|| AppError::Internal(format!("Could not create {table} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    id_field: &str,
    key: &Value,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let mut query = build_update(table, id_field, key, payload)?;
    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(read_row)
        .ok_or_else(|| AppError::NotFound(format!("{table} record not found.")))
}

/// Deletes a row and returns it as it was before deletion.
pub async fn delete_row(
    pool: &sqlx::PgPool,
    table: &str,
    id_field: &str,
    key: &Value,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let filters = key_filter(id_field, key)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_filters(&mut query, &filters)?;
    query.push(" RETURNING row_to_json(t) AS row");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(read_row)
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn count_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Filters>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    if let Some(filter_map) = filters {
        push_filters(&mut query, filter_map)?;
    }

    let row = query.build().fetch_one(pool).await.map_err(map_db_error)?;
    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

pub async fn row_exists(
    pool: &sqlx::PgPool,
    table: &str,
    filters: &Filters,
) -> Result<bool, AppError> {
    Ok(count_rows(pool, table, Some(filters)).await? > 0)
}

fn select_from(table_name: &str) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name.to_string()).push(" t WHERE 1=1");
    query
}

// jsonb_populate_record lets PostgreSQL coerce JSON values to the column
// types (date, bigint, boolean, double precision) declared on the table.
fn build_insert(
    table: &str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?.to_string();
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }
    let columns = sorted_columns(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name.clone()).push(" (");
    query.push(columns.join(", "));
    query.push(") SELECT ");
    query.push(
        columns
            .iter()
            .map(|column| format!("r.{column}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name.clone())
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

fn build_update(
    table: &str,
    id_field: &str,
    key: &Value,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'static, Postgres>, AppError> {
    let table_name = validate_table(table)?.to_string();
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let columns = sorted_columns(payload)?;
    let filters = key_filter(id_field, key)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name.clone()).push(" t SET ");
    query.push(
        columns
            .iter()
            .map(|column| format!("{column} = r.{column}"))
            .collect::<Vec<_>>()
            .join(", "),
    );
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r WHERE 1=1");
    push_filters(&mut query, &filters)?;
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn sorted_columns(payload: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let mut columns = payload
        .keys()
        .map(|key| validate_identifier(key).map(ToOwned::to_owned))
        .collect::<Result<Vec<_>, _>>()?;
    columns.sort_unstable();
    Ok(columns)
}

fn key_filter(id_field: &str, key: &Value) -> Result<Filters, AppError> {
    if key.is_null() {
        return Err(AppError::BadRequest("Record key cannot be empty.".to_string()));
    }
    let mut filters = Map::new();
    filters.insert(validate_identifier(id_field)?.to_string(), key.clone());
    Ok(filters)
}

fn read_row(row: PgRow) -> Option<Value> {
    row.try_get::<Option<Value>, _>("row").ok().flatten()
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter().filter_map(read_row).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Ne,
    IEq,
}

fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let (column, operator) = match filter_key.rsplit_once("__") {
        Some((column, "ne")) => (column, FilterOperator::Ne),
        Some((column, "ieq")) => (column, FilterOperator::IEq),
        _ => (filter_key, FilterOperator::Eq),
    };
    Ok((validate_identifier(column)?, operator))
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filters: &Filters) -> Result<(), AppError> {
    for (key, value) in filters {
        push_filter_clause(query, key, value)?;
    }
    Ok(())
}

fn push_filter_clause(
    query: &mut QueryBuilder<'_, Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;
    query.push(" AND t.").push(column.to_string());

    if value.is_null() {
        query.push(if operator == FilterOperator::Ne {
            " IS NOT NULL"
        } else {
            " IS NULL"
        });
        return Ok(());
    }

    if operator == FilterOperator::IEq {
        let Some(text) = value.as_str() else {
            return Err(AppError::BadRequest(format!(
                "Filter '{filter_key}' requires a text value."
            )));
        };
        query
            .push("::text ILIKE ")
            .push_bind(escape_like(text.trim()));
        return Ok(());
    }

    let comparison = if operator == FilterOperator::Ne {
        " <> "
    } else {
        " = "
    };
    match value {
        Value::Bool(flag) => {
            query.push(comparison).push_bind(*flag);
        }
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                query.push(comparison).push_bind(as_i64);
            } else if let Some(as_f64) = number.as_f64() {
                query.push(comparison).push_bind(as_f64);
            }
        }
        Value::String(text) => {
            query.push("::text").push(comparison).push_bind(text.clone());
        }
        Value::Array(_) | Value::Object(_) => {
            return Err(AppError::BadRequest(format!(
                "Filter '{filter_key}' does not support nested values."
            )));
        }
        Value::Null => {}
    }
    Ok(())
}

/// ILIKE without wildcards is a case-insensitive equality check.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    let valid_chars = trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    });
    let starts_with_digit = trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit());
    if !valid_chars || starts_with_digit {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

pub(crate) fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if let sqlx::Error::Database(database_error) = &error {
        match database_error.code().as_deref() {
            Some("23505") => {
                return AppError::Conflict(
                    "Duplicate value violates a unique constraint.".to_string(),
                )
            }
            Some("23503") => {
                return AppError::Conflict(
                    "Record is still referenced by other records.".to_string(),
                )
            }
            Some("23514") => {
                return AppError::BadRequest("Value violates a check constraint.".to_string())
            }
            _ => {}
        }
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        build_insert, build_update, escape_like, parse_filter_key, push_filters, validate_table,
        FilterOperator,
    };
    use crate::error::AppError;

    fn payload(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let record = payload(&[
            ("payment_type", json!("Check")),
            ("created_by", json!("ops")),
        ]);
        let query = build_insert("payment_types", &record).expect("valid insert");
        let sql = query.sql();
        assert!(
            sql.contains("INSERT INTO payment_types (created_by, payment_type)"),
            "unexpected SQL: {sql}"
        );
        assert!(sql.contains("SELECT r.created_by, r.payment_type"));
        assert!(sql.contains("jsonb_populate_record(NULL::payment_types"));
    }

    #[test]
    fn update_sql_assigns_from_populated_record() {
        let record = payload(&[("notes", json!("late")), ("payment_amount", json!(250.5))]);
        let query =
            build_update("lease_payments", "id", &json!(501), &record).expect("valid update");
        let sql = query.sql();
        assert!(
            sql.contains("notes = r.notes, payment_amount = r.payment_amount"),
            "unexpected SQL: {sql}"
        );
        assert!(sql.contains("AND t.id = $2"), "unexpected SQL: {sql}");
    }

    #[test]
    fn rejects_unknown_tables_and_columns() {
        assert!(matches!(
            validate_table("app_users"),
            Err(AppError::Forbidden(_))
        ));
        let record = payload(&[("bad column", json!(1))]);
        assert!(matches!(
            build_insert("leases", &record),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            build_update("leases", "lease_id", &Value::Null, &payload(&[("active", json!(false))])),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn accepts_property_record_tables() {
        for table in ["residents", "expenses", "fines", "inspections", "utilities", "utility_types"] {
            assert_eq!(validate_table(table).expect("allowed table"), table);
        }
    }

    #[test]
    fn explicit_null_in_patch_clears_the_column() {
        let patch = payload(&[("lease_start_date", Value::Null)]);
        let query = build_update("leases", "lease_id", &json!("L-1"), &patch).expect("update SQL");
        let sql = query.sql();
        assert!(
            sql.contains("SET lease_start_date = r.lease_start_date"),
            "unexpected SQL: {sql}"
        );
    }

    #[test]
    fn parses_filter_suffixes() {
        assert_eq!(
            parse_filter_key("id__ne").expect("valid key"),
            ("id", FilterOperator::Ne)
        );
        assert_eq!(
            parse_filter_key("payment_type__ieq").expect("valid key"),
            ("payment_type", FilterOperator::IEq)
        );
        assert_eq!(
            parse_filter_key("lease_id").expect("valid key"),
            ("lease_id", FilterOperator::Eq)
        );
    }

    #[test]
    fn renders_filter_clauses() {
        let filters = payload(&[
            ("active", json!(true)),
            ("id__ne", json!(7)),
            ("name__ieq", json!("Main St")),
            ("unit_id", Value::Null),
        ]);
        let mut query = QueryBuilder::<Postgres>::new("SELECT 1 FROM units t WHERE 1=1");
        push_filters(&mut query, &filters).expect("valid filters");
        let sql = query.sql();
        assert!(sql.contains("t.active = $1"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.id <> $2"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.name::text ILIKE $3"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.unit_id IS NULL"), "unexpected SQL: {sql}");
    }

    #[test]
    fn escapes_like_wildcards() {
        assert_eq!(escape_like("100%_cash\\"), "100\\%\\_cash\\\\");
    }
}
