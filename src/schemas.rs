use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

fn default_zero() -> i32 {
    0
}

/// Keeps an explicit `null` apart from an absent field: `Some(None)` clears
/// the column, `None` leaves it untouched.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn cleared<T, const N: usize>(fields: [(&'static str, &Option<Option<T>>); N]) -> Vec<&'static str> {
    fields
        .into_iter()
        .filter(|(_, value)| matches!(value, Some(None)))
        .map(|(field, _)| field)
        .collect()
}

// Properties

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreatePropertyInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(min = 1, max = 200))]
    pub address: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(equal = 2))]
    pub state: String,
    #[validate(range(min = 0, max = 99999))]
    pub zipcode: i32,
    #[serde(default = "default_zero")]
    #[validate(range(min = 0))]
    pub unit_count: i32,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdatePropertyInput {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: Option<String>,
    #[validate(length(equal = 2))]
    pub state: Option<String>,
    #[validate(range(min = 0, max = 99999))]
    pub zipcode: Option<i32>,
    #[validate(range(min = 0))]
    pub unit_count: Option<i32>,
}

// Units

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateUnitInput {
    pub property_id: i64,
    #[validate(length(min = 1, max = 50))]
    pub unit_number: String,
    #[validate(range(min = 0, max = 20))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0.0, max = 20.0))]
    pub bathrooms: Option<f64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[serde(default = "default_false")]
    pub rented: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateUnitInput {
    #[validate(length(min = 1, max = 50))]
    pub unit_number: Option<String>,
    #[validate(range(min = 0, max = 20))]
    pub bedrooms: Option<i32>,
    #[validate(range(min = 0.0, max = 20.0))]
    pub bathrooms: Option<f64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub rented: Option<bool>,
}

// Leases

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateLeaseInput {
    #[validate(length(min = 1, max = 100))]
    pub lease_id: String,
    pub property_id: i64,
    pub unit_id: i64,
    pub lease_date: NaiveDate,
    pub lease_start_date: Option<NaiveDate>,
    pub lease_end_date: Option<NaiveDate>,
    #[validate(range(min = 0))]
    pub lease_term: Option<i32>,
    #[validate(range(min = 0.0))]
    pub monthly_rent: f64,
    #[validate(range(min = 0.0))]
    pub security_deposit: Option<f64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateLeaseInput {
    #[validate(length(min = 1, max = 100))]
    pub lease_id: Option<String>,
    pub property_id: Option<i64>,
    pub unit_id: Option<i64>,
    pub lease_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub lease_start_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    pub lease_end_date: Option<Option<NaiveDate>>,
    #[validate(range(min = 0))]
    pub lease_term: Option<i32>,
    #[validate(range(min = 0.0))]
    pub monthly_rent: Option<f64>,
    #[validate(range(min = 0.0))]
    pub security_deposit: Option<f64>,
    pub active: Option<bool>,
}

impl UpdateLeaseInput {
    /// Columns the caller explicitly set to null.
    pub fn cleared_fields(&self) -> Vec<&'static str> {
        cleared([
            ("lease_start_date", &self.lease_start_date),
            ("lease_end_date", &self.lease_end_date),
        ])
    }
}

// Lease payments

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateLeasePaymentInput {
    #[validate(length(min = 1))]
    pub lease_id: String,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    pub payment_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub payment_amount: f64,
    pub payment_due_date: Option<NaiveDate>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// Derived ledger fields are not accepted here; they are always recomputed.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateLeasePaymentInput {
    pub payment_type_id: Option<i64>,
    pub payment_category_id: Option<i64>,
    pub payment_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub payment_amount: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub payment_due_date: Option<Option<NaiveDate>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl UpdateLeasePaymentInput {
    pub fn cleared_fields(&self) -> Vec<&'static str> {
        cleared([("payment_due_date", &self.payment_due_date)])
    }
}

// Lookups. Identity columns are optional here; the lookup table decides
// which of them a create must carry.

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct PaymentTypeInput {
    #[validate(length(min = 1, max = 100))]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct PaymentCategoryInput {
    #[validate(length(min = 2, max = 50))]
    pub payment_category: Option<String>,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct ExpenseTypeInput {
    #[validate(length(min = 2, max = 50))]
    pub expense_type: Option<String>,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct FineTypeInput {
    #[validate(length(min = 1, max = 100))]
    pub fine_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct InspectionTypeInput {
    #[validate(length(min = 1, max = 100))]
    pub inspection_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UtilityTypeInput {
    #[validate(length(min = 1, max = 100))]
    pub utility_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub utility_provider: Option<String>,
    pub active: Option<bool>,
}

// Residents

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateResidentInput {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(email, length(max = 100))]
    pub email: Option<String>,
    #[validate(length(max = 16))]
    pub mobile_number: Option<String>,
    #[validate(length(max = 16))]
    pub home_number: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub lease_id: Option<String>,
    pub unit_id: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateResidentInput {
    #[validate(length(min = 1, max = 50))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub last_name: Option<String>,
    #[validate(email, length(max = 100))]
    pub email: Option<String>,
    #[validate(length(max = 16))]
    pub mobile_number: Option<String>,
    #[validate(length(max = 16))]
    pub home_number: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub lease_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub unit_id: Option<Option<i64>>,
    pub active: Option<bool>,
}

impl UpdateResidentInput {
    /// A resident who moves out keeps their row but loses the lease and unit.
    pub fn cleared_fields(&self) -> Vec<&'static str> {
        let mut fields = cleared([("lease_id", &self.lease_id)]);
        fields.extend(cleared([("unit_id", &self.unit_id)]));
        fields
    }
}

// Expenses

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateExpenseInput {
    pub property_id: i64,
    pub expense_type_id: i64,
    pub expense_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub expense_amount: f64,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateExpenseInput {
    pub property_id: Option<i64>,
    pub expense_type_id: Option<i64>,
    pub expense_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub expense_amount: Option<f64>,
    pub payment_type_id: Option<i64>,
    pub payment_category_id: Option<i64>,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

// Fines

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateFineInput {
    #[validate(length(min = 1, max = 50))]
    pub fine_id: String,
    pub property_id: i64,
    pub lease_id: Option<String>,
    pub fine_type_id: i64,
    pub fine_date: NaiveDate,
    pub fine_due_date: NaiveDate,
    #[validate(range(min = 0.0))]
    pub fine_amount: f64,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

/// `fine_id` is the key and cannot be changed.
#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateFineInput {
    pub property_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub lease_id: Option<Option<String>>,
    pub fine_type_id: Option<i64>,
    pub fine_date: Option<NaiveDate>,
    pub fine_due_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub fine_amount: Option<f64>,
    pub payment_type_id: Option<i64>,
    pub payment_category_id: Option<i64>,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl UpdateFineInput {
    pub fn cleared_fields(&self) -> Vec<&'static str> {
        cleared([("lease_id", &self.lease_id)])
    }
}

// Inspections

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateInspectionInput {
    pub property_id: i64,
    pub inspection_type_id: i64,
    pub inspection_date: NaiveDate,
    #[validate(length(min = 1, max = 100))]
    pub inspected_by: String,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub inspection_amount: f64,
    pub payment_type_id: Option<i64>,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateInspectionInput {
    pub property_id: Option<i64>,
    pub inspection_type_id: Option<i64>,
    pub inspection_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 100))]
    pub inspected_by: Option<String>,
    #[validate(range(min = 0.0))]
    pub inspection_amount: Option<f64>,
    pub payment_type_id: Option<i64>,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

// Utilities

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateUtilityInput {
    pub property_id: i64,
    pub utility_type_id: i64,
    pub reading_date: Option<NaiveDate>,
    #[validate(range(min = 0.0))]
    pub meter_reading: Option<f64>,
    #[validate(range(min = 0.0))]
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct UpdateUtilityInput {
    pub property_id: Option<i64>,
    pub utility_type_id: Option<i64>,
    #[serde(default, deserialize_with = "nullable")]
    pub reading_date: Option<Option<NaiveDate>>,
    #[validate(range(min = 0.0))]
    pub meter_reading: Option<f64>,
    #[validate(range(min = 0.0))]
    pub amount: Option<f64>,
    pub payment_date: Option<NaiveDate>,
    pub payment_type_id: Option<i64>,
    pub payment_category_id: Option<i64>,
    #[validate(range(min = 0))]
    pub check_number: Option<i64>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl UpdateUtilityInput {
    pub fn cleared_fields(&self) -> Vec<&'static str> {
        cleared([("reading_date", &self.reading_date)])
    }
}

// Queries

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PageQuery {
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UnitsQuery {
    pub property_id: Option<i64>,
    pub rented: Option<bool>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasesQuery {
    pub property_id: Option<i64>,
    pub unit_id: Option<i64>,
    pub active: Option<bool>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ResidentsQuery {
    pub lease_id: Option<String>,
    pub unit_id: Option<i64>,
    pub active: Option<bool>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Expenses, fines, inspections and utilities are all filed under a property.
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyRecordsQuery {
    pub property_id: Option<i64>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasePaymentsQuery {
    pub lease_id: Option<String>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

fn default_limit_100() -> i64 {
    100
}

pub fn serialize_to_map<T>(value: &T) -> serde_json::Map<String, serde_json::Value>
where
    T: serde::Serialize,
{
    let json = serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
    json.as_object().cloned().unwrap_or_default()
}

pub fn remove_nulls(
    mut map: serde_json::Map<String, serde_json::Value>,
) -> serde_json::Map<String, serde_json::Value> {
    map.retain(|_, value| !value.is_null());
    map
}

/// PATCH payload: provided fields, plus an explicit null for each cleared column.
pub fn patch_map<T>(value: &T, cleared: &[&str]) -> Map<String, Value>
where
    T: serde::Serialize,
{
    let mut patch = remove_nulls(serialize_to_map(value));
    for field in cleared {
        patch.insert((*field).to_string(), Value::Null);
    }
    patch
}

// Paths

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyPath {
    pub property_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UnitPath {
    pub unit_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasePath {
    pub lease_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct LeasePaymentPath {
    pub payment_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ResidentPath {
    pub resident_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ExpensePath {
    pub expense_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct FinePath {
    pub fine_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct InspectionPath {
    pub inspection_id: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct UtilityPath {
    pub utility_id: i64,
}
