//! Invoice operations: creation, numbering, lifecycle and the one shared
//! status recompute that every payment-side mutation funnels through.

use crate::models::{
    settlement_status, CreateInvoice, Invoice, InvoiceStatus, InvoiceType, LineItem,
    ListInvoicesFilter,
};
use crate::services::metrics::{DB_QUERY_DURATION, INVOICES_CREATED};
use crate::services::Database;
use chrono::Datelike;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::policy::CustomerScope;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Create an invoice with its line items.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, customer_id = %input.customer_id))]
    pub async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = insert_invoice(&mut tx, input).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            total_amount = %invoice.total_amount,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Get an invoice with its line items, honoring the caller's row scope.
    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn get_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
        scope: CustomerScope,
    ) -> Result<Option<(Invoice, Vec<LineItem>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT i.invoice_id, i.tenant_id, i.customer_id, i.invoice_number, i.invoice_type, i.status,
                   i.period_start, i.period_end, i.due_date, i.subtotal, i.discount_percentage, i.total_amount,
                   i.notes, i.created_utc
            FROM invoices i
            JOIN customers c ON c.customer_id = i.customer_id
            WHERE i.tenant_id = $1 AND i.invoice_id = $2
              AND ($3::uuid IS NULL OR c.assigned_employee_id = $3)
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .bind(scope.assigned_employee_filter())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        let invoice = match invoice {
            Some(i) => i,
            None => return Ok(None),
        };

        let line_items = sqlx::query_as::<_, LineItem>(
            r#"
            SELECT line_item_id, invoice_id, tenant_id, description, package_id, inventory_item_id,
                   quantity, unit_price, discount, line_total, sort_order, created_utc
            FROM invoice_line_items
            WHERE invoice_id = $1
            ORDER BY sort_order, line_item_id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get line items: {}", e)))?;

        timer.observe_duration();

        Ok(Some((invoice, line_items)))
    }

    /// List invoices with optional filters, honoring the caller's row scope.
    #[instrument(skip(self, filter, scope), fields(tenant_id = %tenant_id))]
    pub async fn list_invoices(
        &self,
        tenant_id: Uuid,
        filter: &ListInvoicesFilter,
        scope: CustomerScope,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;

        // The stored status never says overdue; that filter value means
        // "unpaid and past due" and is resolved against the due date.
        let (status_filter, only_overdue) = match filter.status {
            Some(InvoiceStatus::Overdue) => (None, true),
            Some(status) => (Some(status.as_str().to_string()), false),
            None => (None, false),
        };

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT i.invoice_id, i.tenant_id, i.customer_id, i.invoice_number, i.invoice_type, i.status,
                   i.period_start, i.period_end, i.due_date, i.subtotal, i.discount_percentage, i.total_amount,
                   i.notes, i.created_utc
            FROM invoices i
            JOIN customers c ON c.customer_id = i.customer_id
            WHERE i.tenant_id = $1
              AND ($2::varchar IS NULL OR i.status = $2)
              AND (NOT $3 OR (i.status IN ('pending', 'partially_paid') AND i.due_date < CURRENT_DATE))
              AND ($4::uuid IS NULL OR i.customer_id = $4)
              AND ($5::varchar IS NULL OR i.invoice_type = $5)
              AND ($6::date IS NULL OR i.due_date >= $6)
              AND ($7::date IS NULL OR i.due_date <= $7)
              AND ($8::uuid IS NULL OR c.assigned_employee_id = $8)
              AND ($9::uuid IS NULL OR i.invoice_id > $9)
            ORDER BY i.invoice_id
            LIMIT $10
            "#,
        )
        .bind(tenant_id)
        .bind(status_filter)
        .bind(only_overdue)
        .bind(filter.customer_id)
        .bind(filter.invoice_type.map(|t| t.as_str()))
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(scope.assigned_employee_filter())
        .bind(filter.page_token)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list invoices: {}", e)))?;

        timer.observe_duration();

        Ok(invoices)
    }

    /// Cancel a non-terminal invoice. Invoices with settled money on them
    /// cannot be cancelled; the payments must be voided first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn cancel_invoice(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = fetch_invoice_for_update(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if invoice.parsed_status() == InvoiceStatus::Cancelled {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is already cancelled",
                invoice.invoice_number
            )));
        }

        let paid = paid_sum(&mut tx, tenant_id, invoice_id).await?;
        if paid > Decimal::ZERO {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} has settled payments and cannot be cancelled",
                invoice.invoice_number
            )));
        }

        let cancelled = sqlx::query_as::<_, Invoice>(
            r#"
            UPDATE invoices SET status = 'cancelled'
            WHERE tenant_id = $1 AND invoice_id = $2
            RETURNING invoice_id, tenant_id, customer_id, invoice_number, invoice_type, status,
                      period_start, period_end, due_date, subtotal, discount_percentage, total_amount,
                      notes, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to cancel invoice: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, "Invoice cancelled");

        Ok(cancelled)
    }

    /// Delete an invoice. Disallowed once any payment references it.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, tenant_id: Uuid, invoice_id: Uuid) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = fetch_invoice_for_update(&mut tx, tenant_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        let payment_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments WHERE tenant_id = $1 AND invoice_id = $2",
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count payments: {}", e)))?;

        if payment_count > 0 {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} has payments and cannot be deleted",
                invoice.invoice_number
            )));
        }

        sqlx::query("DELETE FROM invoice_line_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete line items: {}", e))
            })?;

        sqlx::query("DELETE FROM invoices WHERE tenant_id = $1 AND invoice_id = $2")
            .bind(tenant_id)
            .bind(invoice_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete invoice: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(invoice_id = %invoice_id, "Invoice deleted");

        Ok(())
    }
}

/// Allocate the next invoice number for the type's series, atomically.
pub(crate) async fn allocate_invoice_number(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_type: InvoiceType,
    year: i32,
) -> Result<String, AppError> {
    let series = invoice_type.number_series();

    let sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO invoice_sequences (tenant_id, series, year, last_value)
        VALUES ($1, $2, $3, 1)
        ON CONFLICT (tenant_id, series, year)
        DO UPDATE SET last_value = invoice_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(tenant_id)
    .bind(series)
    .bind(year)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to allocate invoice number: {}", e))
    })?;

    Ok(crate::models::invoice::format_invoice_number(
        series, year, sequence,
    ))
}

/// Insert an invoice and its line items inside the caller's transaction.
pub(crate) async fn insert_invoice(
    conn: &mut PgConnection,
    input: &CreateInvoice,
) -> Result<Invoice, AppError> {
    if input.subtotal < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Invoice subtotal must not be negative"
        )));
    }
    if input.discount_percentage < Decimal::ZERO
        || input.discount_percentage > Decimal::ONE_HUNDRED
    {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Discount percentage must be between 0 and 100"
        )));
    }

    let year = input.due_date.year();
    let invoice_number =
        allocate_invoice_number(&mut *conn, input.tenant_id, input.invoice_type, year).await?;

    let total_amount =
        crate::models::invoice::apply_discount(input.subtotal, input.discount_percentage);

    let invoice_id = Uuid::new_v4();
    let invoice = sqlx::query_as::<_, Invoice>(
        r#"
        INSERT INTO invoices (invoice_id, tenant_id, customer_id, invoice_number, invoice_type, status,
                              period_start, period_end, due_date, subtotal, discount_percentage, total_amount, notes)
        VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7, $8, $9, $10, $11, $12)
        RETURNING invoice_id, tenant_id, customer_id, invoice_number, invoice_type, status,
                  period_start, period_end, due_date, subtotal, discount_percentage, total_amount,
                  notes, created_utc
        "#,
    )
    .bind(invoice_id)
    .bind(input.tenant_id)
    .bind(input.customer_id)
    .bind(&invoice_number)
    .bind(input.invoice_type.as_str())
    .bind(input.period_start)
    .bind(input.period_end)
    .bind(input.due_date)
    .bind(input.subtotal)
    .bind(input.discount_percentage)
    .bind(total_amount)
    .bind(&input.notes)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "An invoice already exists for this customer and period"
            ))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert invoice: {}", e)),
    })?;

    for (sort_order, item) in input.line_items.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_items (line_item_id, invoice_id, tenant_id, description, package_id,
                                            inventory_item_id, quantity, unit_price, discount, line_total, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(input.tenant_id)
        .bind(&item.description)
        .bind(item.package_id)
        .bind(item.inventory_item_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(item.discount)
        .bind(item.line_total())
        .bind(sort_order as i32)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert line item: {}", e))
        })?;
    }

    INVOICES_CREATED
        .with_label_values(&[input.invoice_type.as_str()])
        .inc();

    Ok(invoice)
}

/// Fetch an invoice row-locked, serializing concurrent settlement against it.
pub(crate) async fn fetch_invoice_for_update(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<Option<Invoice>, AppError> {
    sqlx::query_as::<_, Invoice>(
        r#"
        SELECT invoice_id, tenant_id, customer_id, invoice_number, invoice_type, status,
               period_start, period_end, due_date, subtotal, discount_percentage, total_amount,
               notes, created_utc
        FROM invoices
        WHERE tenant_id = $1 AND invoice_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock invoice: {}", e)))
}

/// Sum of the invoice's active paid payments.
pub(crate) async fn paid_sum(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice_id: Uuid,
) -> Result<Decimal, AppError> {
    let sum: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM(amount), 0)
        FROM payments
        WHERE tenant_id = $1 AND invoice_id = $2 AND status = 'paid' AND is_active
        "#,
    )
    .bind(tenant_id)
    .bind(invoice_id)
    .fetch_one(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to sum payments: {}", e)))?;

    Ok(sum.unwrap_or(Decimal::ZERO))
}

/// Recompute an invoice's stored status from its active paid payments.
///
/// The single recompute used by payment creation, verification and
/// deletion. Cancelled invoices are left alone. Returns (old, new).
pub(crate) async fn recompute_invoice_status(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    invoice: &Invoice,
) -> Result<(InvoiceStatus, InvoiceStatus), AppError> {
    let old_status = invoice.parsed_status();
    if old_status.is_terminal() {
        return Ok((old_status, old_status));
    }

    let paid = paid_sum(&mut *conn, tenant_id, invoice.invoice_id).await?;
    let new_status = settlement_status(invoice.total_amount, paid);

    if new_status != old_status {
        sqlx::query("UPDATE invoices SET status = $1 WHERE tenant_id = $2 AND invoice_id = $3")
            .bind(new_status.as_str())
            .bind(tenant_id)
            .bind(invoice.invoice_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to update invoice status: {}", e))
            })?;

        info!(
            invoice_id = %invoice.invoice_id,
            old_status = %old_status,
            new_status = %new_status,
            paid_sum = %paid,
            "Invoice status recomputed"
        );
    }

    Ok((old_status, new_status))
}
