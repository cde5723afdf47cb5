//! Payment endpoints: recording, verification, voiding, deletion.

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
    dtos::{CreatePaymentRequest, DeletePaymentResponse, PaymentResponse, VerifyAction, VerifyPaymentRequest},
    middleware::TenantContext,
    models::{CreatePayment, PaymentStatus},
    AppState,
};

/// Record a payment against an invoice. `status=pending` submits for later
/// verification; the default is an immediately settled payment.
pub async fn create_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    tenant.policy().require(capabilities::PAYMENT_CREATE)?;

    let status = payload.status.unwrap_or(PaymentStatus::Paid);
    if !matches!(status, PaymentStatus::Paid | PaymentStatus::Pending) {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payments may only be recorded as paid or pending"
        )));
    }

    let input = CreatePayment {
        tenant_id: tenant.tenant_id,
        invoice_id: payload.invoice_id,
        amount: payload.amount,
        paid_date: payload.paid_date.unwrap_or_else(|| Utc::now().date_naive()),
        method: payload.method,
        status,
        bank_account_id: payload.bank_account_id,
        received_by: tenant.actor_employee_id,
        reference: payload.reference,
    };

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        invoice_id = %payload.invoice_id,
        amount = %payload.amount,
        status = %status,
        "Recording payment"
    );

    let payment = state.db.add_payment(&input).await?;

    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// Get a payment.
pub async fn get_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state
        .db
        .get_payment(tenant.tenant_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(payment.into()))
}

/// Approve or reject a pending payment.
pub async fn verify_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<VerifyPaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    tenant.policy().require(capabilities::PAYMENT_VERIFY)?;

    let approve = payload.action == VerifyAction::Approve;
    let payment = state
        .db
        .verify_payment(
            tenant.tenant_id,
            payment_id,
            approve,
            payload.reason,
            tenant.actor_employee_id,
        )
        .await?;

    Ok(Json(payment.into()))
}

/// Void a payment: it stops counting toward the invoice but the row stays.
pub async fn void_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    tenant.policy().require(capabilities::PAYMENT_DELETE)?;

    let payment = state.db.void_payment(tenant.tenant_id, payment_id).await?;

    Ok(Json(payment.into()))
}

/// Hard-delete a payment.
pub async fn delete_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<DeletePaymentResponse>, AppError> {
    tenant.policy().require(capabilities::PAYMENT_DELETE)?;

    let invoice_status = state.db.delete_payment(tenant.tenant_id, payment_id).await?;

    Ok(Json(DeletePaymentResponse { invoice_status }))
}
