//! Customer onboarding and lookup.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::policy::capabilities;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{OnboardCustomerRequest, OnboardResponse},
    middleware::TenantContext,
    models::{Customer, EquipmentIssue, OnboardCustomer},
    AppState,
};

/// Onboard a customer: packages, first subscription invoice, equipment.
pub async fn onboard_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<OnboardCustomerRequest>,
) -> Result<(StatusCode, Json<OnboardResponse>), AppError> {
    tenant.policy().require(capabilities::CUSTOMER_ONBOARD)?;
    payload.validate()?;

    let input = OnboardCustomer {
        tenant_id: tenant.tenant_id,
        name: payload.name,
        discount_percentage: payload.discount_percentage.unwrap_or(Decimal::ZERO),
        recharge_day: payload.recharge_day,
        assigned_employee_id: payload.assigned_employee_id,
        plan_ids: payload.plan_ids,
        equipment: payload
            .equipment
            .into_iter()
            .map(|e| EquipmentIssue {
                item_id: e.item_id,
                quantity: e.quantity,
            })
            .collect(),
        join_date: payload.join_date.unwrap_or_else(|| Utc::now().date_naive()),
    };

    tracing::info!(
        tenant_id = %tenant.tenant_id,
        name = %input.name,
        plans = input.plan_ids.len(),
        "Onboarding customer"
    );

    let result = state.db.onboard_customer(&input).await?;

    Ok((
        StatusCode::CREATED,
        Json(OnboardResponse {
            customer: result.customer,
            subscription_invoice: result.subscription_invoice.map(Into::into),
            equipment_invoice: result.equipment_invoice.map(Into::into),
        }),
    ))
}

/// Get a customer, within the caller's row scope.
pub async fn get_customer(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(customer_id): Path<Uuid>,
) -> Result<Json<Customer>, AppError> {
    let customer = state
        .db
        .get_customer(tenant.tenant_id, customer_id, tenant.policy().customer_scope())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Customer not found")))?;

    Ok(Json(customer))
}
