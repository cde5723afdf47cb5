//! Employee ledger model.
//!
//! Entries are append-only signed amounts. The employee's cached
//! `current_balance` is adjusted in the same database transaction that
//! inserts the entry, under a row lock, so the cache can never drift from
//! the ledger history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Ledger entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    ConnectionCommission,
    ComplaintCommission,
    SalaryAccrual,
    Payout,
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::ConnectionCommission => "connection_commission",
            LedgerEntryType::ComplaintCommission => "complaint_commission",
            LedgerEntryType::SalaryAccrual => "salary_accrual",
            LedgerEntryType::Payout => "payout",
            LedgerEntryType::Adjustment => "adjustment",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "connection_commission" => LedgerEntryType::ConnectionCommission,
            "complaint_commission" => LedgerEntryType::ComplaintCommission,
            "salary_accrual" => LedgerEntryType::SalaryAccrual,
            "payout" => LedgerEntryType::Payout,
            _ => LedgerEntryType::Adjustment,
        }
    }

    /// Commission entries carry a unique (type, reference) pair so that
    /// posting the same trigger twice is a no-op.
    pub fn is_commission(&self) -> bool {
        matches!(
            self,
            LedgerEntryType::ConnectionCommission | LedgerEntryType::ComplaintCommission
        )
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Employee ledger row. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmployeeLedgerEntry {
    pub entry_id: Uuid,
    pub tenant_id: Uuid,
    pub employee_id: Uuid,
    pub entry_type: String,
    pub amount: Decimal,
    pub description: Option<String>,
    pub reference_id: Option<Uuid>,
    pub posted_utc: DateTime<Utc>,
}

impl EmployeeLedgerEntry {
    pub fn parsed_type(&self) -> LedgerEntryType {
        LedgerEntryType::from_string(&self.entry_type)
    }
}

/// Input for posting a ledger entry. Amount is signed: positive credits the
/// employee, negative debits them.
#[derive(Debug, Clone)]
pub struct PostLedgerEntry {
    pub tenant_id: Uuid,
    pub employee_id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: Decimal,
    pub description: Option<String>,
    pub reference_id: Option<Uuid>,
}
