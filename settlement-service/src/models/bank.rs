//! Bank account and bank transaction models.
//!
//! Every piece of money movement that touches a bank account posts a
//! `BankTransaction`; the cached `current_balance` is only ever adjusted in
//! the same database transaction that inserts the row. There is no other
//! write path to the balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transaction direction against the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankDirection {
    Credit,
    Debit,
}

impl BankDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankDirection::Credit => "credit",
            BankDirection::Debit => "debit",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "debit" => BankDirection::Debit,
            _ => BankDirection::Credit,
        }
    }

    /// Signed effect on the account balance.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self {
            BankDirection::Credit => amount,
            BankDirection::Debit => -amount,
        }
    }
}

impl std::fmt::Display for BankDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What kind of operation moved the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BankSource {
    Payment,
    PaymentReversal,
    Expense,
    IspPayment,
    ExtraIncome,
    Transfer,
    Adjustment,
}

impl BankSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BankSource::Payment => "payment",
            BankSource::PaymentReversal => "payment_reversal",
            BankSource::Expense => "expense",
            BankSource::IspPayment => "isp_payment",
            BankSource::ExtraIncome => "extra_income",
            BankSource::Transfer => "transfer",
            BankSource::Adjustment => "adjustment",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "payment" => BankSource::Payment,
            "payment_reversal" => BankSource::PaymentReversal,
            "expense" => BankSource::Expense,
            "isp_payment" => BankSource::IspPayment,
            "extra_income" => BankSource::ExtraIncome,
            "transfer" => BankSource::Transfer,
            _ => BankSource::Adjustment,
        }
    }
}

impl std::fmt::Display for BankSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bank account row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BankAccount {
    pub bank_account_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Bank transaction row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BankTransaction {
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub bank_account_id: Uuid,
    pub direction: String,
    pub amount: Decimal,
    pub source_type: String,
    pub reference_id: Option<Uuid>,
    pub description: Option<String>,
    pub posted_utc: DateTime<Utc>,
}

impl BankTransaction {
    pub fn parsed_direction(&self) -> BankDirection {
        BankDirection::from_string(&self.direction)
    }

    pub fn signed_amount(&self) -> Decimal {
        self.parsed_direction().signed(self.amount)
    }
}
