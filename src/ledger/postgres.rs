use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;

use super::{LeaseDirectory, LeasePayment, LeaseTerms, LedgerTotals, NewLeasePayment, PaymentHistoryStore};
use crate::error::{AppError, AppResult};
use crate::repository::table_service::map_db_error;

const PAYMENT_COLUMNS: &str = "id, lease_id, payment_type_id, payment_category_id, payment_date, \
     payment_amount, payment_due_date, notes, monthly_rent, total_paid, balance, \
     created_at, updated_at";

/// Lease directory and payment history backed by the `leases` and
/// `lease_payments` tables.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Option<PgPool>,
}

#[derive(sqlx::FromRow)]
struct LeaseTermsRow {
    lease_id: String,
    monthly_rent: f64,
    lease_date: NaiveDate,
    lease_start_date: Option<NaiveDate>,
}

impl PgLedgerStore {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> AppResult<&PgPool> {
        self.pool.as_ref().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })
    }
}

#[async_trait]
impl LeaseDirectory for PgLedgerStore {
    async fn lookup(&self, lease_id: &str) -> AppResult<Option<LeaseTerms>> {
        let row = sqlx::query_as::<_, LeaseTermsRow>(
            "SELECT lease_id, monthly_rent, lease_date, lease_start_date
             FROM leases
             WHERE lease_id = $1
             LIMIT 1",
        )
        .bind(lease_id)
        .fetch_optional(self.pool()?)
        .await
        .map_err(map_db_error)?;

        Ok(row.map(|row| LeaseTerms {
            lease_id: row.lease_id,
            monthly_rent: row.monthly_rent,
            lease_date: row.lease_date,
            lease_start_date: row.lease_start_date,
        }))
    }
}

#[async_trait]
impl PaymentHistoryStore for PgLedgerStore {
    async fn list_by_lease(&self, lease_id: &str) -> AppResult<Vec<LeasePayment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM lease_payments
             WHERE lease_id = $1
             ORDER BY payment_date ASC, id ASC"
        );
        sqlx::query_as::<_, LeasePayment>(&sql)
            .bind(lease_id)
            .fetch_all(self.pool()?)
            .await
            .map_err(map_db_error)
    }

    async fn persist(
        &self,
        payment: &NewLeasePayment,
        totals: &LedgerTotals,
    ) -> AppResult<LeasePayment> {
        let sql = format!(
            "INSERT INTO lease_payments (
                lease_id, payment_type_id, payment_category_id, payment_date,
                payment_amount, payment_due_date, notes, monthly_rent, total_paid, balance
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {PAYMENT_COLUMNS}"
        );
        sqlx::query_as::<_, LeasePayment>(&sql)
            .bind(&payment.lease_id)
            .bind(payment.payment_type_id)
            .bind(payment.payment_category_id)
            .bind(payment.payment_date)
            .bind(payment.payment_amount)
            .bind(payment.payment_due_date)
            .bind(payment.notes.as_deref())
            .bind(totals.monthly_rent)
            .bind(totals.total_paid)
            .bind(totals.balance)
            .fetch_one(self.pool()?)
            .await
            .map_err(map_db_error)
    }

    async fn update_totals(&self, payment_id: i64, totals: &LedgerTotals) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE lease_payments
             SET monthly_rent = $2, total_paid = $3, balance = $4
             WHERE id = $1",
        )
        .bind(payment_id)
        .bind(totals.monthly_rent)
        .bind(totals.total_paid)
        .bind(totals.balance)
        .execute(self.pool()?)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Lease payment {payment_id} not found."
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::PgLedgerStore;
    use crate::error::AppError;
    use crate::ledger::{LeaseDirectory, LedgerTotals, PaymentHistoryStore};

    #[tokio::test]
    async fn reports_missing_database_as_dependency_error() {
        let store = PgLedgerStore::new(None);

        let lookup = store.lookup("L-1").await;
        assert!(matches!(lookup, Err(AppError::Dependency(_))));

        let totals = LedgerTotals {
            monthly_rent: 1.0,
            total_paid: 1.0,
            balance: 0.0,
        };
        let update = store.update_totals(500, &totals).await;
        assert!(matches!(update, Err(AppError::Dependency(_))));
    }
}
