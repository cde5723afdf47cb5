//! Payment application: recording, verification, voiding and deletion of
//! payments, with the invoice status recompute and follow-up commission
//! enqueue riding in the same transaction.

use crate::models::{
    BankDirection, BankSource, CreatePayment, Invoice, InvoiceStatus, OutboxKind, Payment,
    PaymentStatus,
};
use crate::services::invoices::{fetch_invoice_for_update, paid_sum, recompute_invoice_status};
use crate::services::ledger::post_bank_transaction;
use crate::services::metrics::{DB_QUERY_DURATION, PAYMENTS_TOTAL};
use crate::services::outbox::enqueue_task;
use crate::services::Database;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Record a payment against an invoice.
    ///
    /// For immediately-paid payments the over-payment guard applies and the
    /// invoice status is recomputed in the same transaction; if the invoice
    /// settles, the commission follow-up is enqueued before commit and
    /// dispatched best-effort afterwards.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, invoice_id = %input.invoice_id, amount = %input.amount))]
    pub async fn add_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_payment"])
            .start_timer();

        if input.amount <= Decimal::ZERO {
            PAYMENTS_TOTAL.with_label_values(&["add", "rejected"]).inc();
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }
        if input.method.touches_bank_account()
            && input.status == PaymentStatus::Paid
            && input.bank_account_id.is_none()
        {
            PAYMENTS_TOTAL.with_label_values(&["add", "rejected"]).inc();
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Bank transfer payments require a bank account"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let invoice = fetch_invoice_for_update(&mut tx, input.tenant_id, input.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

        if invoice.parsed_status() == InvoiceStatus::Cancelled {
            PAYMENTS_TOTAL.with_label_values(&["add", "rejected"]).inc();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Invoice {} is cancelled",
                invoice.invoice_number
            )));
        }

        // Pending submissions skip the guard here; it is re-checked when the
        // payment is verified.
        if input.status == PaymentStatus::Paid {
            check_remaining_balance(&mut tx, &invoice, input.amount, "add").await?;
        }

        let payment_id = Uuid::new_v4();
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                                  bank_account_id, received_by, reference)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                      bank_account_id, received_by, reference, failure_reason, is_active, created_utc
            "#,
        )
        .bind(payment_id)
        .bind(input.tenant_id)
        .bind(input.invoice_id)
        .bind(input.amount)
        .bind(input.paid_date)
        .bind(input.method.as_str())
        .bind(input.status.as_str())
        .bind(input.bank_account_id)
        .bind(input.received_by)
        .bind(&input.reference)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)))?;

        if input.status == PaymentStatus::Paid {
            if let (true, Some(bank_account_id)) =
                (input.method.touches_bank_account(), input.bank_account_id)
            {
                post_bank_transaction(
                    &mut tx,
                    input.tenant_id,
                    bank_account_id,
                    BankDirection::Credit,
                    input.amount,
                    BankSource::Payment,
                    Some(payment_id),
                    Some("invoice payment"),
                )
                .await?;
            }

            let (old_status, new_status) =
                recompute_invoice_status(&mut tx, input.tenant_id, &invoice).await?;
            if new_status == InvoiceStatus::Paid && old_status != InvoiceStatus::Paid {
                enqueue_task(
                    &mut tx,
                    input.tenant_id,
                    OutboxKind::ConnectionCommission,
                    invoice.invoice_id,
                )
                .await?;
            }
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["add", "ok"]).inc();

        info!(
            payment_id = %payment.payment_id,
            invoice_id = %input.invoice_id,
            amount = %input.amount,
            status = %input.status,
            "Payment recorded"
        );

        self.dispatch_outbox(input.tenant_id).await;

        Ok(payment)
    }

    /// Get a payment.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                   bank_account_id, received_by, reference, failure_reason, is_active, created_utc
            FROM payments
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    /// List an invoice's payments, oldest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, invoice_id = %invoice_id))]
    pub async fn list_payments(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                   bank_account_id, received_by, reference, failure_reason, is_active, created_utc
            FROM payments
            WHERE tenant_id = $1 AND invoice_id = $2
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Verify a pending payment: approve it into `paid` or reject it into
    /// `failed`. Only pending payments may be verified.
    #[instrument(skip(self, reason), fields(tenant_id = %tenant_id, payment_id = %payment_id, approve = approve))]
    pub async fn verify_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        approve: bool,
        reason: Option<String>,
        verified_by: Option<Uuid>,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["verify_payment"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = fetch_payment_for_update(&mut tx, tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        if payment.parsed_status() != PaymentStatus::Pending || !payment.is_active {
            PAYMENTS_TOTAL
                .with_label_values(&["verify", "rejected"])
                .inc();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment is not pending verification"
            )));
        }

        let updated = if approve {
            let invoice = fetch_invoice_for_update(&mut tx, tenant_id, payment.invoice_id)
                .await?
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

            check_remaining_balance(&mut tx, &invoice, payment.amount, "verify").await?;

            let updated = sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments SET status = 'paid', received_by = $1
                WHERE tenant_id = $2 AND payment_id = $3
                RETURNING payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                          bank_account_id, received_by, reference, failure_reason, is_active, created_utc
                "#,
            )
            .bind(verified_by)
            .bind(tenant_id)
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to approve payment: {}", e))
            })?;

            if let (true, Some(bank_account_id)) = (
                payment.parsed_method().touches_bank_account(),
                payment.bank_account_id,
            ) {
                post_bank_transaction(
                    &mut tx,
                    tenant_id,
                    bank_account_id,
                    BankDirection::Credit,
                    payment.amount,
                    BankSource::Payment,
                    Some(payment_id),
                    Some("invoice payment (verified)"),
                )
                .await?;
            }

            let (old_status, new_status) =
                recompute_invoice_status(&mut tx, tenant_id, &invoice).await?;
            if new_status == InvoiceStatus::Paid && old_status != InvoiceStatus::Paid {
                enqueue_task(
                    &mut tx,
                    tenant_id,
                    OutboxKind::ConnectionCommission,
                    invoice.invoice_id,
                )
                .await?;
            }

            updated
        } else {
            sqlx::query_as::<_, Payment>(
                r#"
                UPDATE payments SET status = 'failed', failure_reason = $1
                WHERE tenant_id = $2 AND payment_id = $3
                RETURNING payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                          bank_account_id, received_by, reference, failure_reason, is_active, created_utc
                "#,
            )
            .bind(reason.as_deref().unwrap_or("rejected"))
            .bind(tenant_id)
            .bind(payment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to reject payment: {}", e))
            })?
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["verify", "ok"]).inc();

        info!(
            payment_id = %payment_id,
            approved = approve,
            "Payment verified"
        );

        if approve {
            self.dispatch_outbox(tenant_id).await;
        }

        Ok(updated)
    }

    /// Void a payment: soft-invalidate it, reverse its bank credit and
    /// recompute the invoice from the remaining active payments.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn void_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["void_payment"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = fetch_payment_for_update(&mut tx, tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        if !payment.is_active {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment is already voided"
            )));
        }

        reverse_bank_credit(&mut tx, &payment).await?;

        let voided = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments SET is_active = FALSE, status = 'cancelled'
            WHERE tenant_id = $1 AND payment_id = $2
            RETURNING payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
                      bank_account_id, received_by, reference, failure_reason, is_active, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to void payment: {}", e)))?;

        let invoice = fetch_invoice_for_update(&mut tx, tenant_id, payment.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        recompute_invoice_status(&mut tx, tenant_id, &invoice).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["void", "ok"]).inc();

        info!(payment_id = %payment_id, "Payment voided");

        Ok(voided)
    }

    /// Hard-delete a payment, reversing its bank credit and recomputing the
    /// invoice status from whatever payments remain.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<InvoiceStatus, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_payment"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = fetch_payment_for_update(&mut tx, tenant_id, payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        reverse_bank_credit(&mut tx, &payment).await?;

        sqlx::query("DELETE FROM payments WHERE tenant_id = $1 AND payment_id = $2")
            .bind(tenant_id)
            .bind(payment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete payment: {}", e))
            })?;

        let invoice = fetch_invoice_for_update(&mut tx, tenant_id, payment.invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
        let (_, new_status) = recompute_invoice_status(&mut tx, tenant_id, &invoice).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        PAYMENTS_TOTAL.with_label_values(&["delete", "ok"]).inc();

        info!(
            payment_id = %payment_id,
            invoice_id = %payment.invoice_id,
            new_status = %new_status,
            "Payment deleted"
        );

        Ok(new_status)
    }
}

/// The over-payment guard: settled money plus the incoming amount must not
/// exceed the invoice total. Rejections count against the operation that
/// tripped the guard.
async fn check_remaining_balance(
    conn: &mut PgConnection,
    invoice: &Invoice,
    amount: Decimal,
    operation: &'static str,
) -> Result<(), AppError> {
    let paid = paid_sum(&mut *conn, invoice.tenant_id, invoice.invoice_id).await?;
    if paid + amount > invoice.total_amount {
        PAYMENTS_TOTAL
            .with_label_values(&[operation, "rejected"])
            .inc();
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment of {} exceeds invoice balance ({} of {} already paid)",
            amount,
            paid,
            invoice.total_amount
        )));
    }
    Ok(())
}

/// Fetch a payment row-locked.
async fn fetch_payment_for_update(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    payment_id: Uuid,
) -> Result<Option<Payment>, AppError> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT payment_id, tenant_id, invoice_id, amount, paid_date, method, status,
               bank_account_id, received_by, reference, failure_reason, is_active, created_utc
        FROM payments
        WHERE tenant_id = $1 AND payment_id = $2
        FOR UPDATE
        "#,
    )
    .bind(tenant_id)
    .bind(payment_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock payment: {}", e)))
}

/// Post the reversing bank debit for a payment that credited a bank
/// account, if it did.
async fn reverse_bank_credit(conn: &mut PgConnection, payment: &Payment) -> Result<(), AppError> {
    if let Some(bank_account_id) = payment.credited_bank_account() {
        post_bank_transaction(
            &mut *conn,
            payment.tenant_id,
            bank_account_id,
            BankDirection::Debit,
            payment.amount,
            BankSource::PaymentReversal,
            Some(payment.payment_id),
            Some("payment reversal"),
        )
        .await?;
    }
    Ok(())
}
