//! Request and response bodies for the REST surface.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    BillingRun, BillingRunResult, Customer, EmployeeLedgerEntry, Invoice, InvoiceStatus,
    InvoiceType, LineItem, Payment, PaymentMethod, PaymentStatus,
};

#[derive(Deserialize)]
pub struct EquipmentIssueRequest {
    pub item_id: Uuid,
    pub quantity: i32,
}

#[derive(Deserialize, Validate)]
pub struct OnboardCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub discount_percentage: Option<Decimal>,
    #[validate(range(min = 1, max = 28))]
    pub recharge_day: i32,
    pub assigned_employee_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub plan_ids: Vec<Uuid>,
    #[serde(default)]
    pub equipment: Vec<EquipmentIssueRequest>,
    /// Connection date; defaults to today.
    pub join_date: Option<NaiveDate>,
}

#[derive(Deserialize, Serialize, Validate)]
pub struct LineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
}

#[derive(Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub due_date: NaiveDate,
    pub discount_percentage: Option<Decimal>,
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub line_items: Vec<LineItemRequest>,
}

#[derive(Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub invoice_type: Option<InvoiceType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    /// Defaults to today.
    pub paid_date: Option<NaiveDate>,
    pub method: PaymentMethod,
    /// `paid` (default) or `pending` for self-service submissions awaiting
    /// verification.
    pub status: Option<PaymentStatus>,
    pub bank_account_id: Option<Uuid>,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyAction {
    Approve,
    Reject,
}

#[derive(Deserialize)]
pub struct VerifyPaymentRequest {
    pub action: VerifyAction,
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct BillingRunRequest {
    /// Run date; defaults to today.
    pub as_of: Option<NaiveDate>,
}

#[derive(Deserialize, Default)]
pub struct OutboxRunRequest {
    pub limit: Option<i64>,
}

/// Invoice as read paths see it: `status` is the effective status, with
/// overdue derived from the due date at response time.
#[derive(Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub customer_id: Uuid,
    pub invoice_number: String,
    pub invoice_type: String,
    pub status: InvoiceStatus,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub subtotal: Decimal,
    pub discount_percentage: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_utc: chrono::DateTime<Utc>,
}

impl From<Invoice> for InvoiceResponse {
    fn from(invoice: Invoice) -> Self {
        let status = invoice.effective_status(Utc::now().date_naive());
        Self {
            invoice_id: invoice.invoice_id,
            customer_id: invoice.customer_id,
            invoice_number: invoice.invoice_number,
            invoice_type: invoice.invoice_type,
            status,
            period_start: invoice.period_start,
            period_end: invoice.period_end,
            due_date: invoice.due_date,
            subtotal: invoice.subtotal,
            discount_percentage: invoice.discount_percentage,
            total_amount: invoice.total_amount,
            notes: invoice.notes,
            created_utc: invoice.created_utc,
        }
    }
}

#[derive(Serialize)]
pub struct InvoiceDetailResponse {
    #[serde(flatten)]
    pub invoice: InvoiceResponse,
    pub line_items: Vec<LineItem>,
}

#[derive(Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<InvoiceResponse>,
    /// Pass back as `page_token` to continue the listing.
    pub next_page_token: Option<Uuid>,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
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
    pub created_utc: chrono::DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            payment_id: payment.payment_id,
            invoice_id: payment.invoice_id,
            amount: payment.amount,
            paid_date: payment.paid_date,
            method: payment.method,
            status: payment.status,
            bank_account_id: payment.bank_account_id,
            received_by: payment.received_by,
            reference: payment.reference,
            failure_reason: payment.failure_reason,
            is_active: payment.is_active,
            created_utc: payment.created_utc,
        }
    }
}

#[derive(Serialize)]
pub struct DeletePaymentResponse {
    /// Invoice status after recomputing from the remaining payments.
    pub invoice_status: InvoiceStatus,
}

#[derive(Serialize)]
pub struct OnboardResponse {
    pub customer: Customer,
    pub subscription_invoice: Option<InvoiceResponse>,
    pub equipment_invoice: Option<InvoiceResponse>,
}

#[derive(Serialize)]
pub struct StatementLine {
    #[serde(flatten)]
    pub entry: EmployeeLedgerEntry,
    pub running_balance: Decimal,
}

#[derive(Serialize)]
pub struct EmployeeStatementResponse {
    pub employee_id: Uuid,
    pub current_balance: Decimal,
    pub entries: Vec<StatementLine>,
}

#[derive(Serialize)]
pub struct EmployeeBalanceResponse {
    pub employee_id: Uuid,
    pub current_balance: Decimal,
    pub paid_amount: Decimal,
}

#[derive(Serialize)]
pub struct BillingRunResponse {
    pub run: BillingRun,
    pub results: Vec<BillingRunResult>,
}
