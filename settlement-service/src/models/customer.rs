//! Customer, employee and subscription models, plus the billing-period math
//! used by the recurring invoice generator.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Customer row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub discount_percentage: Decimal,
    /// Day of month (1..=28) the subscription renews and is re-billed.
    pub recharge_day: i32,
    pub assigned_employee_id: Option<Uuid>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Employee row. `current_balance` mirrors the employee ledger and is only
/// written by the ledger posting path; `paid_amount` accumulates payouts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Employee {
    pub employee_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub connection_commission: Decimal,
    pub complaint_commission: Decimal,
    pub current_balance: Decimal,
    pub paid_amount: Decimal,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Service plan row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServicePlan {
    pub plan_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub monthly_price: Decimal,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Customer ↔ plan subscription. End-dated when removed, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerPackage {
    pub package_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

/// Equipment issued to a customer at connection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentIssue {
    pub item_id: Uuid,
    pub quantity: i32,
}

/// Input for onboarding a customer: identity, subscriptions and any
/// equipment issued at connection time.
#[derive(Debug, Clone)]
pub struct OnboardCustomer {
    pub tenant_id: Uuid,
    pub name: String,
    pub discount_percentage: Decimal,
    pub recharge_day: i32,
    pub assigned_employee_id: Option<Uuid>,
    pub plan_ids: Vec<Uuid>,
    pub equipment: Vec<EquipmentIssue>,
    pub join_date: NaiveDate,
}

/// One billing cycle: `[start, end]` inclusive, one calendar month long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl BillingPeriod {
    /// The cycle after this one.
    pub fn next(&self) -> BillingPeriod {
        let start = self.start + Months::new(1);
        BillingPeriod {
            start,
            end: period_end(start),
        }
    }
}

fn period_end(start: NaiveDate) -> NaiveDate {
    (start + Months::new(1))
        .pred_opt()
        .unwrap_or(start)
}

fn date_with_day(year: i32, month: u32, day: u32) -> NaiveDate {
    // recharge_day is constrained to 1..=28, so this always resolves on the
    // first try; the clamp keeps the helper total.
    (1..=day)
        .rev()
        .find_map(|d| NaiveDate::from_ymd_opt(year, month, d))
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).expect("valid month"))
}

/// The billing period containing `as_of` for a customer renewing on
/// `recharge_day`: it starts on the most recent occurrence of that day.
pub fn billing_period_for(recharge_day: u32, as_of: NaiveDate) -> BillingPeriod {
    let this_month = date_with_day(as_of.year(), as_of.month(), recharge_day);
    let start = if as_of < this_month {
        this_month - Months::new(1)
    } else {
        this_month
    };
    BillingPeriod {
        start,
        end: period_end(start),
    }
}

/// Whether a customer joining on `join_date` gets next month's cycle
/// generated immediately: connections made on or after the 25th bill ahead.
pub fn bills_next_cycle_early(join_date: NaiveDate) -> bool {
    join_date.day() >= 25
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn period_starts_on_most_recent_recharge_day() {
        let period = billing_period_for(10, d(2026, 8, 24));
        assert_eq!(period.start, d(2026, 8, 10));
        assert_eq!(period.end, d(2026, 9, 9));

        // Before the recharge day, the running period began last month.
        let period = billing_period_for(10, d(2026, 8, 3));
        assert_eq!(period.start, d(2026, 7, 10));
        assert_eq!(period.end, d(2026, 8, 9));
    }

    #[test]
    fn period_on_the_recharge_day_itself_starts_that_day() {
        let period = billing_period_for(1, d(2026, 2, 1));
        assert_eq!(period.start, d(2026, 2, 1));
        assert_eq!(period.end, d(2026, 2, 28));
    }

    #[test]
    fn next_period_advances_one_month() {
        let period = billing_period_for(15, d(2026, 1, 20));
        let next = period.next();
        assert_eq!(next.start, d(2026, 2, 15));
        assert_eq!(next.end, d(2026, 3, 14));
    }

    #[test]
    fn month_end_clamping_stays_total() {
        // Day 28 across February.
        let period = billing_period_for(28, d(2026, 2, 28));
        assert_eq!(period.start, d(2026, 2, 28));
        assert_eq!(period.end, d(2026, 3, 27));
    }

    #[test]
    fn late_month_connections_bill_ahead() {
        assert!(bills_next_cycle_early(d(2026, 8, 25)));
        assert!(bills_next_cycle_early(d(2026, 8, 31)));
        assert!(!bills_next_cycle_early(d(2026, 8, 24)));
    }
}
