use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use super::accrual::{sort_ledger, sum_amounts, Accrual};
use super::locks::LeaseLocks;
use super::{LeaseDirectory, LeasePayment, LedgerError, NewLeasePayment, PaymentHistoryStore};

/// Source of "today" for rent accrual.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().date_naive())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildOutcome {
    LeaseMissing,
    Empty,
    Rebuilt { rewritten: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerSummary {
    pub lease_id: String,
    #[serde(flatten)]
    pub accrual: Accrual,
    pub total_paid: f64,
    pub balance: f64,
    pub payments: Vec<LeasePayment>,
}

#[derive(Clone)]
pub struct LedgerRecalculator {
    leases: Arc<dyn LeaseDirectory>,
    payments: Arc<dyn PaymentHistoryStore>,
    locks: LeaseLocks,
    clock: Clock,
}

impl LedgerRecalculator {
    pub fn new(leases: Arc<dyn LeaseDirectory>, payments: Arc<dyn PaymentHistoryStore>) -> Self {
        Self {
            leases,
            payments,
            locks: LeaseLocks::new(),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    /// Derives `monthly_rent`, `total_paid` and `balance` for a new payment
    /// and stores it in a single write. Nothing is stored on failure.
    pub async fn record_payment(
        &self,
        payment: NewLeasePayment,
    ) -> Result<LeasePayment, LedgerError> {
        if !payment.payment_amount.is_finite() || payment.payment_amount < 0.0 {
            return Err(LedgerError::InvalidPayment(
                "Payment amount must be a non-negative number.".to_string(),
            ));
        }

        let _guard = self.locks.acquire(&payment.lease_id).await;

        let lease = self
            .leases
            .lookup(&payment.lease_id)
            .await?
            .ok_or_else(|| LedgerError::LeaseNotFound(payment.lease_id.clone()))?;

        let accrual = Accrual::as_of(&lease, self.today());
        let history = self.payments.list_by_lease(&lease.lease_id).await?;
        let totals = accrual.totals_for(sum_amounts(&history) + payment.payment_amount);

        let stored = self.payments.persist(&payment, &totals).await?;
        tracing::info!(
            lease_id = %stored.lease_id,
            payment_id = stored.id,
            months_elapsed = accrual.months_elapsed,
            total_paid = stored.total_paid,
            balance = stored.balance,
            "Lease payment recorded"
        );
        Ok(stored)
    }

    /// Hook for the delete path. Never fails: the delete has already happened.
    pub async fn on_payment_deleted(&self, lease_id: &str) {
        self.refresh_ledger(lease_id, "payment deleted").await;
    }

    /// Rebuilds a ledger and logs the outcome instead of returning it.
    pub async fn refresh_ledger(&self, lease_id: &str, reason: &str) {
        match self.rebuild_ledger(lease_id).await {
            Ok(RebuildOutcome::LeaseMissing) => {
                tracing::warn!(lease_id, reason, "Lease not found during ledger recalculation");
            }
            Ok(RebuildOutcome::Empty) => {
                tracing::debug!(lease_id, reason, "No payments left to recalculate");
            }
            Ok(RebuildOutcome::Rebuilt { rewritten }) => {
                tracing::info!(lease_id, reason, rewritten, "Lease ledger recalculated");
            }
            Err(error) => {
                tracing::error!(lease_id, reason, error = %error, "Lease ledger recalculation failed");
            }
        }
    }

    /// Rewrites the running totals of every payment of a lease, evaluating
    /// expected rent as of today.
    pub async fn rebuild_ledger(&self, lease_id: &str) -> Result<RebuildOutcome, LedgerError> {
        let _guard = self.locks.acquire(lease_id).await;

        let Some(lease) = self.leases.lookup(lease_id).await? else {
            return Ok(RebuildOutcome::LeaseMissing);
        };

        let mut payments = self.payments.list_by_lease(lease_id).await?;
        if payments.is_empty() {
            return Ok(RebuildOutcome::Empty);
        }
        sort_ledger(&mut payments);

        let accrual = Accrual::as_of(&lease, self.today());
        let rows = accrual.running_totals(&payments);
        for (payment_id, totals) in &rows {
            self.payments.update_totals(*payment_id, totals).await?;
        }

        Ok(RebuildOutcome::Rebuilt {
            rewritten: rows.len(),
        })
    }

    /// Current position of a lease: what is owed as of today against what
    /// has been paid, plus the stored payment rows in ledger order.
    pub async fn summary(&self, lease_id: &str) -> Result<LedgerSummary, LedgerError> {
        let lease = self
            .leases
            .lookup(lease_id)
            .await?
            .ok_or_else(|| LedgerError::LeaseNotFound(lease_id.to_string()))?;

        let mut payments = self.payments.list_by_lease(lease_id).await?;
        sort_ledger(&mut payments);

        let accrual = Accrual::as_of(&lease, self.today());
        let totals = accrual.totals_for(sum_amounts(&payments));

        Ok(LedgerSummary {
            lease_id: lease.lease_id,
            accrual,
            total_paid: totals.total_paid,
            balance: totals.balance,
            payments,
        })
    }
}
