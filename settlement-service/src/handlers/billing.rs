//! Billing run and outbox endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use service_core::policy::capabilities;
use uuid::Uuid;

use crate::{
    dtos::{BillingRunRequest, BillingRunResponse, OutboxRunRequest},
    middleware::TenantContext,
    models::{BillingRun, BillingRunType, OutboxTask},
    services::outbox::OutboxSummary,
    AppState,
};

const DEFAULT_OUTBOX_BATCH: i64 = 50;

/// Start a manual recurring billing run.
pub async fn run_billing(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<BillingRunRequest>,
) -> Result<(StatusCode, Json<BillingRun>), AppError> {
    tenant.policy().require(capabilities::BILLING_RUN)?;

    let as_of = payload.as_of.unwrap_or_else(|| Utc::now().date_naive());

    tracing::info!(tenant_id = %tenant.tenant_id, as_of = %as_of, "Starting billing run");

    let run = state
        .db
        .run_recurring_billing(tenant.tenant_id, BillingRunType::Manual, as_of)
        .await?;

    Ok((StatusCode::CREATED, Json(run)))
}

/// Get a billing run with its per-customer results.
pub async fn get_billing_run(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(run_id): Path<Uuid>,
) -> Result<Json<BillingRunResponse>, AppError> {
    let (run, results) = state
        .db
        .get_billing_run(tenant.tenant_id, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing run not found")))?;

    Ok(Json(BillingRunResponse { run, results }))
}

/// Drain pending outbox tasks for the tenant.
pub async fn run_outbox(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<OutboxRunRequest>,
) -> Result<Json<OutboxSummary>, AppError> {
    tenant.policy().require(capabilities::OUTBOX_RUN)?;

    let limit = payload.limit.unwrap_or(DEFAULT_OUTBOX_BATCH).clamp(1, 500);
    let summary = state.db.process_outbox(tenant.tenant_id, limit).await?;

    Ok(Json(summary))
}

/// List recent outbox tasks for the tenant.
pub async fn list_outbox_tasks(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<OutboxTask>>, AppError> {
    tenant.policy().require(capabilities::OUTBOX_RUN)?;

    let tasks = state.db.list_outbox_tasks(tenant.tenant_id, 100).await?;

    Ok(Json(tasks))
}
