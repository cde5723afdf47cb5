//! Payment model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How the money arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Online,
    BankTransfer,
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Online => "online",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CreditCard => "credit_card",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "online" => PaymentMethod::Online,
            "bank_transfer" => PaymentMethod::BankTransfer,
            "credit_card" => PaymentMethod::CreditCard,
            _ => PaymentMethod::Cash,
        }
    }

    /// Bank-routed payments move the referenced bank account balance.
    pub fn touches_bank_account(&self) -> bool {
        matches!(self, PaymentMethod::BankTransfer)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment status. Self-service submissions start `pending` and move to
/// `paid` or `failed` through verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub paid_date: NaiveDate,
    pub method: String,
    pub status: String,
    pub bank_account_id: Option<Uuid>,
    pub received_by: Option<Uuid>,
    pub reference: Option<String>,
    pub failure_reason: Option<String>,
    pub is_active: bool,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    pub fn parsed_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }

    pub fn parsed_method(&self) -> PaymentMethod {
        PaymentMethod::from_string(&self.method)
    }

    /// Whether this payment currently counts toward the invoice's paid sum.
    pub fn counts_as_paid(&self) -> bool {
        self.is_active && self.parsed_status() == PaymentStatus::Paid
    }

    /// Whether a bank credit was posted for this payment and must be
    /// reversed when the payment goes away.
    pub fn credited_bank_account(&self) -> Option<Uuid> {
        if self.counts_as_paid() && self.parsed_method().touches_bank_account() {
            self.bank_account_id
        } else {
            None
        }
    }
}

/// Input for recording a payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub paid_date: NaiveDate,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub bank_account_id: Option<Uuid>,
    pub received_by: Option<Uuid>,
    pub reference: Option<String>,
}
