//! Domain models for the settlement engine.

pub mod bank;
pub mod billing_run;
pub mod complaint;
pub mod customer;
pub mod inventory;
pub mod invoice;
pub mod ledger;
pub mod line_item;
pub mod outbox;
pub mod payment;

pub use bank::{BankAccount, BankDirection, BankSource, BankTransaction};
pub use billing_run::{BillingRun, BillingRunResult, BillingRunStatus, BillingRunType};
pub use complaint::{Complaint, ComplaintStatus};
pub use customer::{
    billing_period_for, bills_next_cycle_early, BillingPeriod, Customer, CustomerPackage, Employee,
    EquipmentIssue, OnboardCustomer, ServicePlan,
};
pub use inventory::{InventoryItem, InventoryTransaction};
pub use invoice::{
    settlement_status, CreateInvoice, Invoice, InvoiceStatus, InvoiceType, ListInvoicesFilter,
};
pub use ledger::{EmployeeLedgerEntry, LedgerEntryType, PostLedgerEntry};
pub use line_item::{CreateLineItem, LineItem};
pub use outbox::{OutboxKind, OutboxStatus, OutboxTask, MAX_OUTBOX_ATTEMPTS};
pub use payment::{CreatePayment, Payment, PaymentMethod, PaymentStatus};
