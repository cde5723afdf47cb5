//! Complaint endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use service_core::policy::capabilities;
use uuid::Uuid;

use crate::{middleware::TenantContext, models::Complaint, AppState};

/// Get a complaint.
pub async fn get_complaint(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(complaint_id): Path<Uuid>,
) -> Result<Json<Complaint>, AppError> {
    let complaint = state
        .db
        .get_complaint(tenant.tenant_id, complaint_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Complaint not found")))?;

    Ok(Json(complaint))
}

/// Resolve a complaint, triggering the assignee's complaint commission.
pub async fn resolve_complaint(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(complaint_id): Path<Uuid>,
) -> Result<Json<Complaint>, AppError> {
    tenant.policy().require(capabilities::COMPLAINT_RESOLVE)?;

    let complaint = state
        .db
        .resolve_complaint(tenant.tenant_id, complaint_id)
        .await?;

    Ok(Json(complaint))
}
