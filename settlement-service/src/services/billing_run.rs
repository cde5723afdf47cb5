//! Recurring invoice generator.
//!
//! A run walks every active customer with a live subscription, works out the
//! billing period due at the run date, and raises the period's invoice if it
//! does not already exist. Each customer is processed in its own
//! transaction; one customer failing never aborts the run.

use crate::models::{
    billing_period_for, bills_next_cycle_early, BillingPeriod, BillingRun, BillingRunResult,
    BillingRunStatus, BillingRunType, CreateInvoice, CreateLineItem, Customer, InvoiceType,
};
use crate::services::database::active_packages;
use crate::services::invoices::insert_invoice;
use crate::services::metrics::{BILLING_RUN_CUSTOMERS, DB_QUERY_DURATION};
use crate::services::Database;
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const SUBSCRIPTION_DUE_DAYS: u64 = 15;

impl Database {
    /// Execute a recurring billing run for a tenant as of a given date.
    ///
    /// Idempotent per (customer, period): re-running for an already-billed
    /// period records a skip instead of a duplicate invoice.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, as_of = %as_of))]
    pub async fn run_recurring_billing(
        &self,
        tenant_id: Uuid,
        run_type: BillingRunType,
        as_of: NaiveDate,
    ) -> Result<BillingRun, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["run_recurring_billing"])
            .start_timer();

        let run_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO billing_runs (run_id, tenant_id, run_type, as_of) VALUES ($1, $2, $3, $4)",
        )
        .bind(run_id)
        .bind(tenant_id)
        .bind(run_type.as_str())
        .bind(as_of)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to start billing run: {}", e)))?;

        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT DISTINCT c.customer_id, c.tenant_id, c.name, c.discount_percentage, c.recharge_day,
                   c.assigned_employee_id, c.is_active, c.created_utc
            FROM customers c
            JOIN customer_packages cp ON cp.customer_id = c.customer_id
            WHERE c.tenant_id = $1 AND c.is_active
              AND cp.is_active AND (cp.end_date IS NULL OR cp.end_date >= $2)
            ORDER BY c.customer_id
            "#,
        )
        .bind(tenant_id)
        .bind(as_of)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list billable customers: {}", e))
        })?;

        let mut processed = 0i32;
        let mut succeeded = 0i32;
        let mut skipped = 0i32;
        let mut failed = 0i32;

        for customer in &customers {
            for period in periods_due(customer, as_of) {
                processed += 1;
                match self.bill_customer_period(customer, period, as_of).await {
                    Ok(Some(invoice_id)) => {
                        succeeded += 1;
                        BILLING_RUN_CUSTOMERS.with_label_values(&["invoiced"]).inc();
                        self.record_result(run_id, customer.customer_id, "invoiced", Some(invoice_id), None)
                            .await?;
                    }
                    Ok(None) => {
                        skipped += 1;
                        BILLING_RUN_CUSTOMERS.with_label_values(&["skipped"]).inc();
                        self.record_result(run_id, customer.customer_id, "skipped", None, None)
                            .await?;
                    }
                    Err(err) => {
                        failed += 1;
                        BILLING_RUN_CUSTOMERS.with_label_values(&["failed"]).inc();
                        warn!(
                            customer_id = %customer.customer_id,
                            period_start = %period.start,
                            error = %err,
                            "Billing failed for customer"
                        );
                        self.record_result(
                            run_id,
                            customer.customer_id,
                            "failed",
                            None,
                            Some(err.to_string()),
                        )
                        .await?;
                    }
                }
            }
        }

        let run = sqlx::query_as::<_, BillingRun>(
            r#"
            UPDATE billing_runs
            SET status = $1, completed_utc = NOW(),
                customers_processed = $2, customers_succeeded = $3,
                customers_skipped = $4, customers_failed = $5
            WHERE run_id = $6
            RETURNING run_id, tenant_id, run_type, status, as_of, started_utc, completed_utc,
                      customers_processed, customers_succeeded, customers_skipped, customers_failed, error_message
            "#,
        )
        .bind(BillingRunStatus::Completed.as_str())
        .bind(processed)
        .bind(succeeded)
        .bind(skipped)
        .bind(failed)
        .bind(run_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to finalize billing run: {}", e))
        })?;

        timer.observe_duration();

        info!(
            run_id = %run_id,
            processed = processed,
            succeeded = succeeded,
            skipped = skipped,
            failed = failed,
            "Billing run completed"
        );

        Ok(run)
    }

    /// Get a billing run with its per-customer results.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, run_id = %run_id))]
    pub async fn get_billing_run(
        &self,
        tenant_id: Uuid,
        run_id: Uuid,
    ) -> Result<Option<(BillingRun, Vec<BillingRunResult>)>, AppError> {
        let run = sqlx::query_as::<_, BillingRun>(
            r#"
            SELECT run_id, tenant_id, run_type, status, as_of, started_utc, completed_utc,
                   customers_processed, customers_succeeded, customers_skipped, customers_failed, error_message
            FROM billing_runs
            WHERE tenant_id = $1 AND run_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(run_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get billing run: {}", e)))?;

        let run = match run {
            Some(r) => r,
            None => return Ok(None),
        };

        let results = sqlx::query_as::<_, BillingRunResult>(
            r#"
            SELECT result_id, run_id, customer_id, status, invoice_id, error_message, created_utc
            FROM billing_run_results
            WHERE run_id = $1
            ORDER BY created_utc, result_id
            "#,
        )
        .bind(run_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get billing run results: {}", e))
        })?;

        Ok(Some((run, results)))
    }

    /// Raise the period invoice for one customer, or skip if it exists.
    /// Returns the invoice id when one was created.
    async fn bill_customer_period(
        &self,
        customer: &Customer,
        period: BillingPeriod,
        as_of: NaiveDate,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT invoice_id FROM invoices
            WHERE tenant_id = $1 AND customer_id = $2 AND period_start = $3
              AND invoice_type = 'subscription' AND status <> 'cancelled'
            "#,
        )
        .bind(customer.tenant_id)
        .bind(customer.customer_id)
        .bind(period.start)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to check existing invoice: {}", e))
        })?;

        if existing.is_some() {
            return Ok(None);
        }

        let packages =
            active_packages(&mut *tx, customer.tenant_id, customer.customer_id, as_of).await?;
        if packages.is_empty() {
            return Ok(None);
        }

        let mut subtotal = Decimal::ZERO;
        let mut line_items = Vec::with_capacity(packages.len());
        for (package, plan) in &packages {
            subtotal += plan.monthly_price;
            line_items.push(CreateLineItem {
                description: plan.name.clone(),
                package_id: Some(package.package_id),
                inventory_item_id: None,
                quantity: Decimal::ONE,
                unit_price: plan.monthly_price,
                discount: Decimal::ZERO,
            });
        }

        let invoice = insert_invoice(
            &mut tx,
            &CreateInvoice {
                tenant_id: customer.tenant_id,
                customer_id: customer.customer_id,
                invoice_type: InvoiceType::Subscription,
                period_start: Some(period.start),
                period_end: Some(period.end),
                due_date: period
                    .start
                    .checked_add_days(Days::new(SUBSCRIPTION_DUE_DAYS))
                    .unwrap_or(period.end),
                subtotal,
                discount_percentage: customer.discount_percentage,
                notes: None,
                line_items,
            },
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(Some(invoice.invoice_id))
    }

    async fn record_result(
        &self,
        run_id: Uuid,
        customer_id: Uuid,
        status: &str,
        invoice_id: Option<Uuid>,
        error_message: Option<String>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO billing_run_results (result_id, run_id, customer_id, status, invoice_id, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(run_id)
        .bind(customer_id)
        .bind(status)
        .bind(invoice_id)
        .bind(error_message)
        .execute(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record run result: {}", e))
        })?;
        Ok(())
    }
}

/// The periods a customer owes invoices for at `as_of`: the cycle running at
/// the run date, plus the next cycle for customers connected on or after the
/// 25th of the current month.
fn periods_due(customer: &Customer, as_of: NaiveDate) -> Vec<BillingPeriod> {
    let current = billing_period_for(customer.recharge_day as u32, as_of);
    let mut periods = vec![current];

    let joined = customer.created_utc.date_naive();
    let joined_this_month = joined.year() == as_of.year() && joined.month() == as_of.month();
    if joined_this_month && bills_next_cycle_early(joined) {
        periods.push(current.next());
    }

    periods
}
