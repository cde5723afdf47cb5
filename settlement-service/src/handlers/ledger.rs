//! Employee ledger and bank account read endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::policy::capabilities;
use uuid::Uuid;

use crate::{
    dtos::{EmployeeBalanceResponse, EmployeeStatementResponse, StatementLine},
    middleware::TenantContext,
    models::{BankAccount, BankTransaction},
    AppState,
};

#[derive(Deserialize)]
pub struct TransactionsQuery {
    pub page_size: Option<i32>,
}

/// Employee ledger statement with running balance, oldest first.
pub async fn employee_ledger(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(employee_id): Path<Uuid>,
) -> Result<Json<EmployeeStatementResponse>, AppError> {
    tenant.policy().require(capabilities::LEDGER_READ)?;

    let (current_balance, entries) = state
        .db
        .get_employee_statement(tenant.tenant_id, employee_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Employee not found")))?;

    Ok(Json(EmployeeStatementResponse {
        employee_id,
        current_balance,
        entries: entries
            .into_iter()
            .map(|(entry, running_balance)| StatementLine {
                entry,
                running_balance,
            })
            .collect(),
    }))
}

/// Employee balance summary.
pub async fn employee_balance(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(employee_id): Path<Uuid>,
) -> Result<Json<EmployeeBalanceResponse>, AppError> {
    tenant.policy().require(capabilities::LEDGER_READ)?;

    let employee = state
        .db
        .get_employee(tenant.tenant_id, employee_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Employee not found")))?;

    Ok(Json(EmployeeBalanceResponse {
        employee_id: employee.employee_id,
        current_balance: employee.current_balance,
        paid_amount: employee.paid_amount,
    }))
}

/// Get a bank account.
pub async fn get_bank_account(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bank_account_id): Path<Uuid>,
) -> Result<Json<BankAccount>, AppError> {
    tenant.policy().require(capabilities::LEDGER_READ)?;

    let account = state
        .db
        .get_bank_account(tenant.tenant_id, bank_account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Bank account not found")))?;

    Ok(Json(account))
}

/// List a bank account's transactions, newest first.
pub async fn list_bank_transactions(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(bank_account_id): Path<Uuid>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<Vec<BankTransaction>>, AppError> {
    tenant.policy().require(capabilities::LEDGER_READ)?;

    let transactions = state
        .db
        .list_bank_transactions(
            tenant.tenant_id,
            bank_account_id,
            query.page_size.unwrap_or(50),
        )
        .await?;

    Ok(Json(transactions))
}
