//! Prometheus metrics for settlement-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "settlement_db_query_duration_seconds",
        "Database query duration in seconds",
        &["query"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register db_query_duration")
});

/// Payments recorded, by final status of the operation.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_payments_total",
        "Total number of payment operations",
        &["operation", "status"] // ok, rejected, error - no tenant label to keep cardinality down
    )
    .expect("Failed to register payments_total")
});

/// Invoices created, by type.
pub static INVOICES_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_invoices_created_total",
        "Total number of invoices created",
        &["invoice_type"]
    )
    .expect("Failed to register invoices_created")
});

/// Commission ledger entries posted, by entry type.
pub static COMMISSIONS_POSTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_commissions_posted_total",
        "Total number of commission ledger entries posted",
        &["entry_type"]
    )
    .expect("Failed to register commissions_posted")
});

/// Outbox task dispatch outcomes.
pub static OUTBOX_TASKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_outbox_tasks_total",
        "Outbox task dispatch outcomes",
        &["kind", "outcome"] // done, retry, failed
    )
    .expect("Failed to register outbox_tasks")
});

/// Billing run per-customer outcomes.
pub static BILLING_RUN_CUSTOMERS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "settlement_billing_run_customers_total",
        "Per-customer outcomes of recurring billing runs",
        &["outcome"] // invoiced, skipped, failed
    )
    .expect("Failed to register billing_run_customers")
});

/// Render all registered metrics in the Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
