use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::{LeasePayment, LeaseTerms};

/// Derived fields stored on every payment row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub monthly_rent: f64,
    pub total_paid: f64,
    pub balance: f64,
}

/// Rent accrued on a lease as of a given day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Accrual {
    pub accrual_start: NaiveDate,
    pub as_of: NaiveDate,
    pub months_elapsed: i64,
    pub monthly_rent: f64,
    pub expected_total_rent: f64,
}

impl Accrual {
    pub fn as_of(lease: &LeaseTerms, today: NaiveDate) -> Self {
        let accrual_start = lease.accrual_start();
        let months_elapsed = months_elapsed(accrual_start, today);
        Self {
            accrual_start,
            as_of: today,
            months_elapsed,
            monthly_rent: lease.monthly_rent,
            expected_total_rent: expected_total_rent(lease.monthly_rent, months_elapsed),
        }
    }

    /// Amounts are stored as computed; presentation decides on rounding.
    pub fn totals_for(&self, total_paid: f64) -> LedgerTotals {
        LedgerTotals {
            monthly_rent: self.monthly_rent,
            total_paid,
            balance: self.expected_total_rent - total_paid,
        }
    }

    /// Running totals for `payments`, which must already be in ledger order.
    pub fn running_totals(&self, payments: &[LeasePayment]) -> Vec<(i64, LedgerTotals)> {
        let mut running = 0.0;
        payments
            .iter()
            .map(|payment| {
                running += payment.payment_amount;
                (payment.id, self.totals_for(running))
            })
            .collect()
    }
}

/// Whole calendar months between two dates, floored at one.
///
/// Day-of-month is ignored: Jan 31 -> Feb 1 already counts as one month.
pub fn months_elapsed(start: NaiveDate, today: NaiveDate) -> i64 {
    let years = i64::from(today.year()) - i64::from(start.year());
    let months = i64::from(today.month()) - i64::from(start.month());
    (years * 12 + months).max(1)
}

pub fn expected_total_rent(monthly_rent: f64, months_elapsed: i64) -> f64 {
    monthly_rent * months_elapsed as f64
}

pub fn sum_amounts(payments: &[LeasePayment]) -> f64 {
    payments.iter().map(|payment| payment.payment_amount).sum()
}

/// Ledger order: payment date, then insertion order.
pub fn sort_ledger(payments: &mut [LeasePayment]) {
    payments.sort_by(|left, right| {
        left.payment_date
            .cmp(&right.payment_date)
            .then(left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::{months_elapsed, sort_ledger, Accrual};
    use crate::ledger::{LeasePayment, LeaseTerms};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn payment(id: i64, payment_date: NaiveDate, amount: f64) -> LeasePayment {
        LeasePayment {
            id,
            lease_id: "L-1".to_string(),
            payment_type_id: 600,
            payment_category_id: 1100,
            payment_date,
            payment_amount: amount,
            payment_due_date: None,
            notes: None,
            monthly_rent: 0.0,
            total_paid: 0.0,
            balance: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn counts_calendar_months_only() {
        assert_eq!(months_elapsed(date(2024, 1, 1), date(2024, 3, 15)), 2);
        assert_eq!(months_elapsed(date(2024, 1, 31), date(2024, 2, 1)), 1);
        assert_eq!(months_elapsed(date(2023, 11, 15), date(2024, 2, 14)), 3);
    }

    #[test]
    fn floors_at_one_month() {
        assert_eq!(months_elapsed(date(2024, 3, 1), date(2024, 3, 31)), 1);
        // Lease starting in the future still accrues one month.
        assert_eq!(months_elapsed(date(2025, 6, 1), date(2024, 3, 1)), 1);
    }

    #[test]
    fn accrues_from_lease_terms() {
        let lease = LeaseTerms {
            lease_id: "L-1".to_string(),
            monthly_rent: 1000.0,
            lease_date: date(2023, 12, 15),
            lease_start_date: Some(date(2024, 1, 1)),
        };
        let accrual = Accrual::as_of(&lease, date(2024, 3, 15));
        assert_eq!(accrual.months_elapsed, 2);
        assert_eq!(accrual.expected_total_rent, 2000.0);

        let totals = accrual.totals_for(500.0);
        assert_eq!(totals.total_paid, 500.0);
        assert_eq!(totals.balance, 1500.0);
        assert_eq!(totals.monthly_rent, 1000.0);
    }

    #[test]
    fn balance_goes_negative_on_overpayment() {
        let lease = LeaseTerms {
            lease_id: "L-1".to_string(),
            monthly_rent: 800.0,
            lease_date: date(2024, 1, 1),
            lease_start_date: None,
        };
        let totals = Accrual::as_of(&lease, date(2024, 1, 20)).totals_for(1000.0);
        assert_eq!(totals.balance, -200.0);
    }

    #[test]
    fn running_totals_follow_ledger_order() {
        let lease = LeaseTerms {
            lease_id: "L-1".to_string(),
            monthly_rent: 1000.0,
            lease_date: date(2024, 1, 1),
            lease_start_date: None,
        };
        let accrual = Accrual::as_of(&lease, date(2024, 4, 2));

        let mut payments = vec![
            payment(502, date(2024, 3, 1), 300.0),
            payment(500, date(2024, 2, 1), 100.0),
            payment(501, date(2024, 2, 1), 200.0),
        ];
        sort_ledger(&mut payments);
        let ids: Vec<i64> = payments.iter().map(|item| item.id).collect();
        assert_eq!(ids, vec![500, 501, 502]);

        let totals = accrual.running_totals(&payments);
        assert_eq!(totals[0].1.total_paid, 100.0);
        assert_eq!(totals[1].1.total_paid, 300.0);
        assert_eq!(totals[2].1.total_paid, 600.0);
        assert_eq!(totals[2].1.balance, 2400.0);
    }

    #[test]
    fn keeps_fractions_of_a_cent() {
        let lease = LeaseTerms {
            lease_id: "L-1".to_string(),
            monthly_rent: 0.3,
            lease_date: date(2024, 1, 1),
            lease_start_date: None,
        };
        let accrual = Accrual::as_of(&lease, date(2024, 4, 1));
        assert_eq!(accrual.expected_total_rent, 0.3 * 3.0);

        let paid = 0.004 + 0.004;
        let totals = accrual.totals_for(paid);
        assert_eq!(totals.total_paid, paid);
        assert_eq!(totals.balance, 0.3 * 3.0 - paid);
    }
}
