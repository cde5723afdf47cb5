pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;

use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use tower_http::trace::TraceLayer;

use config::Config;
use services::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

/// Build the full router: ops endpoints plus the tenant-scoped API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        // Customers
        .route("/customers", post(handlers::customers::onboard_customer))
        .route("/customers/:id", get(handlers::customers::get_customer))
        // Invoices
        .route(
            "/invoices",
            post(handlers::invoices::create_invoice).get(handlers::invoices::list_invoices),
        )
        .route(
            "/invoices/:id",
            get(handlers::invoices::get_invoice).delete(handlers::invoices::delete_invoice),
        )
        .route("/invoices/:id/cancel", post(handlers::invoices::cancel_invoice))
        .route(
            "/invoices/:id/payments",
            get(handlers::invoices::list_invoice_payments),
        )
        // Payments
        .route("/payments", post(handlers::payments::create_payment))
        .route(
            "/payments/:id",
            get(handlers::payments::get_payment).delete(handlers::payments::delete_payment),
        )
        .route("/payments/:id/verify", post(handlers::payments::verify_payment))
        .route("/payments/:id/void", post(handlers::payments::void_payment))
        // Complaints
        .route("/complaints/:id", get(handlers::complaints::get_complaint))
        .route(
            "/complaints/:id/resolve",
            post(handlers::complaints::resolve_complaint),
        )
        // Billing runs and the outbox
        .route("/billing-runs", post(handlers::billing::run_billing))
        .route("/billing-runs/:id", get(handlers::billing::get_billing_run))
        .route("/outbox/run", post(handlers::billing::run_outbox))
        .route("/outbox/tasks", get(handlers::billing::list_outbox_tasks))
        // Ledgers
        .route("/employees/:id/ledger", get(handlers::ledger::employee_ledger))
        .route("/employees/:id/balance", get(handlers::ledger::employee_balance))
        .route("/bank-accounts/:id", get(handlers::ledger::get_bank_account))
        .route(
            "/bank-accounts/:id/transactions",
            get(handlers::ledger::list_bank_transactions),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    tenant_id = tracing::field::Empty,
                    actor_role = tracing::field::Empty,
                )
            }),
        )
        .with_state(state)
}
