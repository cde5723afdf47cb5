//! Invoice model and the settlement rules that drive its status.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::line_item::CreateLineItem;

/// Invoice type. Each type draws numbers from its own series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    Subscription,
    Equipment,
    Adhoc,
}

impl InvoiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceType::Subscription => "subscription",
            InvoiceType::Equipment => "equipment",
            InvoiceType::Adhoc => "adhoc",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "equipment" => InvoiceType::Equipment,
            "adhoc" => InvoiceType::Adhoc,
            _ => InvoiceType::Subscription,
        }
    }

    /// Prefix of the number series for this type.
    pub fn number_series(&self) -> &'static str {
        match self {
            InvoiceType::Equipment => "EQP",
            _ => "INV",
        }
    }
}

impl std::fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice status.
///
/// `overdue` is derived at read time from the due date; it is never stored,
/// so the persisted status is always one of the other four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partially_paid" => InvoiceStatus::PartiallyPaid,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Pending,
        }
    }

    /// Cancelled invoices never move again; paid invoices only move through
    /// payment deletion, which recomputes from the remaining payments.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Cancelled)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: String,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount_percentage: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn parsed_status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn parsed_type(&self) -> InvoiceType {
        InvoiceType::from_string(&self.invoice_type)
    }

    /// Status as seen by read paths: a pending or partially paid invoice past
    /// its due date reads as overdue. The stored status is left untouched.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        match self.parsed_status() {
            InvoiceStatus::Pending | InvoiceStatus::PartiallyPaid if self.due_date < today => {
                InvoiceStatus::Overdue
            }
            status => status,
        }
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_type: InvoiceType,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount_percentage: Decimal,
    pub notes: Option<String>,
    pub line_items: Vec<CreateLineItem>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub invoice_type: Option<InvoiceType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// The settlement rule: what an invoice's stored status must be, given its
/// total and the sum of its active paid payments. Every status recompute in
/// the service funnels through this one function.
pub fn settlement_status(total_amount: Decimal, paid_sum: Decimal) -> InvoiceStatus {
    if paid_sum >= total_amount {
        InvoiceStatus::Paid
    } else if paid_sum > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else {
        InvoiceStatus::Pending
    }
}

/// Total after the percentage discount, rounded to cents.
pub fn apply_discount(subtotal: Decimal, discount_percentage: Decimal) -> Decimal {
    let discount = (subtotal * discount_percentage / Decimal::ONE_HUNDRED).round_dp(2);
    (subtotal - discount).round_dp(2)
}

/// Render a number from a per-(series, year) sequence: `INV-2026-0042`.
pub fn format_invoice_number(series: &str, year: i32, sequence: i64) -> String {
    format!("{}-{}-{:04}", series, year, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn settlement_status_follows_paid_sum() {
        let total = dec("1000");
        assert_eq!(settlement_status(total, Decimal::ZERO), InvoiceStatus::Pending);
        assert_eq!(
            settlement_status(total, dec("400")),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(settlement_status(total, dec("1000")), InvoiceStatus::Paid);
        // Over-payment is rejected upstream, but the rule itself stays total.
        assert_eq!(settlement_status(total, dec("1200")), InvoiceStatus::Paid);
    }

    #[test]
    fn discount_is_percentage_of_subtotal() {
        assert_eq!(apply_discount(dec("1000"), dec("10")), dec("900.00"));
        assert_eq!(apply_discount(dec("1000"), Decimal::ZERO), dec("1000.00"));
        assert_eq!(apply_discount(dec("499.99"), dec("5")), dec("474.99"));
    }

    #[test]
    fn invoice_numbers_are_zero_padded_per_series() {
        assert_eq!(format_invoice_number("INV", 2026, 7), "INV-2026-0007");
        assert_eq!(format_invoice_number("EQP", 2026, 12345), "EQP-2026-12345");
    }

    #[test]
    fn effective_status_derives_overdue_from_due_date() {
        let mut invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            invoice_number: "INV-2026-0001".into(),
            invoice_type: "subscription".into(),
            status: "pending".into(),
            period_start: None,
            period_end: None,
            due_date: NaiveDate::from_ymd_opt(2026, 8, 10).unwrap(),
            subtotal: dec("1000"),
            discount_percentage: Decimal::ZERO,
            total_amount: dec("1000"),
            notes: None,
            created_utc: Utc::now(),
        };

        let today = NaiveDate::from_ymd_opt(2026, 8, 20).unwrap();
        assert_eq!(invoice.effective_status(today), InvoiceStatus::Overdue);

        // Paid and cancelled invoices never read as overdue.
        invoice.status = "paid".into();
        assert_eq!(invoice.effective_status(today), InvoiceStatus::Paid);
        invoice.status = "cancelled".into();
        assert_eq!(invoice.effective_status(today), InvoiceStatus::Cancelled);

        // Not yet due.
        invoice.status = "pending".into();
        let earlier = NaiveDate::from_ymd_opt(2026, 8, 10).unwrap();
        assert_eq!(invoice.effective_status(earlier), InvoiceStatus::Pending);
    }
}
