//! In-memory ledger store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::accrual::sort_ledger;
use super::{LeaseDirectory, LeasePayment, LeaseTerms, LedgerTotals, NewLeasePayment, PaymentHistoryStore};
use crate::error::{AppError, AppResult};

const FIRST_PAYMENT_ID: i64 = 500;

#[derive(Default)]
pub struct MemoryLedgerStore {
    leases: RwLock<HashMap<String, LeaseTerms>>,
    payments: RwLock<Vec<LeasePayment>>,
    updates: AtomicUsize,
    fail_updates: AtomicBool,
    io_delay: bool,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yields between reads and writes so unguarded callers would interleave.
    pub fn with_io_delay(mut self) -> Self {
        self.io_delay = true;
        self
    }

    pub async fn insert_lease(&self, lease: LeaseTerms) {
        self.leases
            .write()
            .await
            .insert(lease.lease_id.clone(), lease);
    }

    pub async fn delete_payment(&self, payment_id: i64) -> bool {
        let mut payments = self.payments.write().await;
        let before = payments.len();
        payments.retain(|payment| payment.id != payment_id);
        payments.len() != before
    }

    /// Payments of a lease in ledger order.
    pub async fn payments_for(&self, lease_id: &str) -> Vec<LeasePayment> {
        let mut rows: Vec<LeasePayment> = self
            .payments
            .read()
            .await
            .iter()
            .filter(|payment| payment.lease_id == lease_id)
            .cloned()
            .collect();
        sort_ledger(&mut rows);
        rows
    }

    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }

    pub fn total_updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    async fn pause(&self) {
        if self.io_delay {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl LeaseDirectory for MemoryLedgerStore {
    async fn lookup(&self, lease_id: &str) -> AppResult<Option<LeaseTerms>> {
        Ok(self.leases.read().await.get(lease_id).cloned())
    }
}

#[async_trait]
impl PaymentHistoryStore for MemoryLedgerStore {
    async fn list_by_lease(&self, lease_id: &str) -> AppResult<Vec<LeasePayment>> {
        let rows = self.payments_for(lease_id).await;
        self.pause().await;
        Ok(rows)
    }

    async fn persist(
        &self,
        payment: &NewLeasePayment,
        totals: &LedgerTotals,
    ) -> AppResult<LeasePayment> {
        self.pause().await;
        let mut payments = self.payments.write().await;
        let id = payments
            .iter()
            .map(|row| row.id + 1)
            .max()
            .unwrap_or(FIRST_PAYMENT_ID);
        let now = Utc::now();
        let row = LeasePayment {
            id,
            lease_id: payment.lease_id.clone(),
            payment_type_id: payment.payment_type_id,
            payment_category_id: payment.payment_category_id,
            payment_date: payment.payment_date,
            payment_amount: payment.payment_amount,
            payment_due_date: payment.payment_due_date,
            notes: payment.notes.clone(),
            monthly_rent: totals.monthly_rent,
            total_paid: totals.total_paid,
            balance: totals.balance,
            created_at: now,
            updated_at: now,
        };
        payments.push(row.clone());
        Ok(row)
    }

    async fn update_totals(&self, payment_id: i64, totals: &LedgerTotals) -> AppResult<()> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(AppError::Dependency("Database operation failed.".to_string()));
        }
        let mut payments = self.payments.write().await;
        let row = payments
            .iter_mut()
            .find(|row| row.id == payment_id)
            .ok_or_else(|| AppError::NotFound("lease_payments record not found.".to_string()))?;
        row.monthly_rent = totals.monthly_rent;
        row.total_paid = totals.total_paid;
        row.balance = totals.balance;
        row.updated_at = Utc::now();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
