//! Lease-payment ledger.
//!
//! Every payment row carries derived running totals (`monthly_rent`,
//! `total_paid`, `balance`). They are computed once when the payment is
//! recorded and rewritten for the whole lease whenever a sibling payment is
//! deleted or edited. Expected rent is always accrued up to *today*, so a
//! ledger rebuilt next month shows a different balance for the same payments.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::{AppError, AppResult};

pub mod accrual;
pub mod locks;
#[cfg(test)]
pub mod memory;
pub mod postgres;
pub mod recalculator;

pub use accrual::{Accrual, LedgerTotals};
pub use recalculator::{LedgerRecalculator, LedgerSummary, RebuildOutcome};

/// Lease terms needed to accrue rent.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseTerms {
    pub lease_id: String,
    pub monthly_rent: f64,
    /// Date the lease was signed. Accrual falls back to it when no explicit
    /// start date is set.
    pub lease_date: NaiveDate,
    pub lease_start_date: Option<NaiveDate>,
}

impl LeaseTerms {
    pub fn accrual_start(&self) -> NaiveDate {
        self.lease_start_date.unwrap_or(self.lease_date)
    }
}

/// A settled payment row.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct LeasePayment {
    pub id: i64,
    pub lease_id: String,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    pub payment_date: NaiveDate,
    pub payment_amount: f64,
    pub payment_due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub monthly_rent: f64,
    pub total_paid: f64,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A payment awaiting derivation. Inputs are already validated by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLeasePayment {
    pub lease_id: String,
    pub payment_type_id: i64,
    pub payment_category_id: i64,
    pub payment_date: NaiveDate,
    pub payment_amount: f64,
    pub payment_due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[async_trait]
pub trait LeaseDirectory: Send + Sync {
    async fn lookup(&self, lease_id: &str) -> AppResult<Option<LeaseTerms>>;
}

#[async_trait]
pub trait PaymentHistoryStore: Send + Sync {
    /// All payments of a lease, ascending by payment date, ties by insertion order.
    async fn list_by_lease(&self, lease_id: &str) -> AppResult<Vec<LeasePayment>>;

    async fn persist(
        &self,
        payment: &NewLeasePayment,
        totals: &LedgerTotals,
    ) -> AppResult<LeasePayment>;

    /// Rewrites the derived fields only. No create-time validation applies.
    async fn update_totals(&self, payment_id: i64, totals: &LedgerTotals) -> AppResult<()>;
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidPayment(String),
    #[error("Lease with ID {0} not found.")]
    LeaseNotFound(String),
    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<LedgerError> for AppError {
    fn from(error: LedgerError) -> Self {
        match error {
            LedgerError::InvalidPayment(message) => AppError::BadRequest(message),
            LedgerError::LeaseNotFound(_) => AppError::NotFound(error.to_string()),
            LedgerError::Store(inner) => inner,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{LeaseTerms, LedgerError};
    use crate::error::AppError;

    #[test]
    fn accrual_start_falls_back_to_lease_date() {
        let mut lease = LeaseTerms {
            lease_id: "L-100".to_string(),
            monthly_rent: 900.0,
            lease_date: NaiveDate::from_ymd_opt(2023, 12, 20).expect("valid date"),
            lease_start_date: None,
        };
        assert_eq!(
            lease.accrual_start(),
            NaiveDate::from_ymd_opt(2023, 12, 20).expect("valid date")
        );

        lease.lease_start_date = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert_eq!(
            lease.accrual_start(),
            NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
        );
    }

    #[test]
    fn ledger_errors_map_to_http_errors() {
        let not_found: AppError = LedgerError::LeaseNotFound("L-404".to_string()).into();
        assert!(matches!(not_found, AppError::NotFound(ref message) if message.contains("L-404")));

        let invalid: AppError = LedgerError::InvalidPayment("bad".to_string()).into();
        assert!(matches!(invalid, AppError::BadRequest(_)));

        let store: AppError = LedgerError::Store(AppError::Dependency("db".to_string())).into();
        assert!(matches!(store, AppError::Dependency(_)));
    }
}
