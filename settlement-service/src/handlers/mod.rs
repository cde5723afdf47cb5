//! HTTP handlers. Every business route runs under a [`TenantContext`] and
//! checks the caller's capability before touching the database.

pub mod billing;
pub mod complaints;
pub mod customers;
pub mod invoices;
pub mod ledger;
pub mod payments;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde_json::json;

use crate::services::get_metrics;
use crate::AppState;

/// Liveness probe.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "settlement-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness probe: verifies the database answers.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready" })),
        ),
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}
