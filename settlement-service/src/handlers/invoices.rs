//! Invoice lifecycle endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use service_core::policy::capabilities;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        CreateInvoiceRequest, InvoiceDetailResponse, InvoiceResponse, ListInvoicesQuery,
        ListInvoicesResponse, PaymentResponse,
    },
    middleware::TenantContext,
    models::{CreateInvoice, CreateLineItem, InvoiceType, ListInvoicesFilter},
    AppState,
};

const DEFAULT_PAGE_SIZE: i32 = 50;

/// Create an ad-hoc invoice.
pub async fn create_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    tenant.policy().require(capabilities::INVOICE_CREATE)?;
    payload.validate()?;

    let line_items: Vec<CreateLineItem> = payload
        .line_items
        .into_iter()
        .map(|item| CreateLineItem {
            description: item.description,
            package_id: None,
            inventory_item_id: None,
            quantity: item.quantity,
            unit_price: item.unit_price,
            discount: item.discount,
        })
        .collect();

    // The subtotal is the sum of line totals; the customer-level percentage
    // discount then applies on top of any per-line discounts.
    let subtotal = line_items.iter().map(|item| item.line_total()).sum();

    let input = CreateInvoice {
        tenant_id: tenant.tenant_id,
        customer_id: payload.customer_id,
        invoice_type: InvoiceType::Adhoc,
        period_start: None,
        period_end: None,
        due_date: payload.due_date,
        subtotal,
        discount_percentage: payload.discount_percentage.unwrap_or_default(),
        notes: payload.notes,
        line_items,
    };

    let invoice = state.db.create_invoice(&input).await?;

    Ok((StatusCode::CREATED, Json(invoice.into())))
}

/// Get an invoice with its line items.
pub async fn get_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceDetailResponse>, AppError> {
    let (invoice, line_items) = state
        .db
        .get_invoice(tenant.tenant_id, invoice_id, tenant.policy().customer_scope())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(InvoiceDetailResponse {
        invoice: invoice.into(),
        line_items,
    }))
}

/// List invoices with optional filters.
pub async fn list_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<ListInvoicesResponse>, AppError> {
    let filter = ListInvoicesFilter {
        status: query.status,
        customer_id: query.customer_id,
        invoice_type: query.invoice_type,
        start_date: query.start_date,
        end_date: query.end_date,
        page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        page_token: query.page_token,
    };

    let invoices = state
        .db
        .list_invoices(tenant.tenant_id, &filter, tenant.policy().customer_scope())
        .await?;

    let next_page_token = if invoices.len() as i64 >= filter.page_size.clamp(1, 100) as i64 {
        invoices.last().map(|i| i.invoice_id)
    } else {
        None
    };

    Ok(Json(ListInvoicesResponse {
        invoices: invoices.into_iter().map(Into::into).collect(),
        next_page_token,
    }))
}

/// Cancel an invoice without settled money on it.
pub async fn cancel_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    tenant.policy().require(capabilities::INVOICE_CANCEL)?;

    let invoice = state.db.cancel_invoice(tenant.tenant_id, invoice_id).await?;

    Ok(Json(invoice.into()))
}

/// Delete an invoice that no payment references.
pub async fn delete_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    tenant.policy().require(capabilities::INVOICE_CANCEL)?;

    state.db.delete_invoice(tenant.tenant_id, invoice_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// List an invoice's payments, oldest first.
pub async fn list_invoice_payments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    let payments = state.db.list_payments(tenant.tenant_id, invoice_id).await?;

    Ok(Json(payments.into_iter().map(Into::into).collect()))
}
