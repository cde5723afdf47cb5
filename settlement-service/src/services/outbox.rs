//! Outbox: queued, retryable follow-up tasks for settled invoices and
//! resolved complaints.
//!
//! Tasks are enqueued inside the transaction of the triggering write and
//! dispatched after commit. The primary operation never fails because a
//! follow-up failed; an undispatched task simply stays pending until the
//! next drain.

use crate::models::{
    LedgerEntryType, OutboxKind, OutboxStatus, OutboxTask, PostLedgerEntry, MAX_OUTBOX_ATTEMPTS,
};
use crate::services::ledger::post_employee_entry;
use crate::services::metrics::{DB_QUERY_DURATION, OUTBOX_TASKS};
use crate::services::Database;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Outcome counts of one outbox drain.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct OutboxSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl Database {
    /// Drain pending outbox tasks for a tenant, oldest first.
    ///
    /// Each task runs in its own transaction; a failure increments its
    /// attempt counter and parks it as failed once the attempts are
    /// exhausted. Other tasks keep going.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn process_outbox(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<OutboxSummary, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["process_outbox"])
            .start_timer();

        let tasks = sqlx::query_as::<_, OutboxTask>(
            r#"
            SELECT task_id, tenant_id, kind, reference_id, status, attempts, last_error, created_utc, processed_utc
            FROM outbox_tasks
            WHERE tenant_id = $1 AND status = 'pending' AND attempts < $2
            ORDER BY created_utc, task_id
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(MAX_OUTBOX_ATTEMPTS)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch outbox tasks: {}", e)))?;

        let mut summary = OutboxSummary::default();

        for task in tasks {
            summary.processed += 1;
            match self.execute_task(&task).await {
                Ok(()) => {
                    self.mark_task(&task, OutboxStatus::Done, None).await?;
                    OUTBOX_TASKS.with_label_values(&[&task.kind, "done"]).inc();
                    summary.succeeded += 1;
                }
                Err(err) => {
                    let attempts = task.attempts + 1;
                    let exhausted = attempts >= MAX_OUTBOX_ATTEMPTS;
                    let status = if exhausted {
                        OutboxStatus::Failed
                    } else {
                        OutboxStatus::Pending
                    };
                    warn!(
                        task_id = %task.task_id,
                        kind = %task.kind,
                        attempts = attempts,
                        error = %err,
                        "Outbox task dispatch failed"
                    );
                    self.mark_task(&task, status, Some(err.to_string())).await?;
                    OUTBOX_TASKS
                        .with_label_values(&[task.kind.as_str(), if exhausted { "failed" } else { "retry" }])
                        .inc();
                    summary.failed += 1;
                }
            }
        }

        timer.observe_duration();

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Outbox drained"
            );
        }

        Ok(summary)
    }

    /// Best-effort drain after a commit. Errors are logged and swallowed;
    /// the tasks stay queued for the next drain.
    pub(crate) async fn dispatch_outbox(&self, tenant_id: Uuid) {
        if let Err(err) = self.process_outbox(tenant_id, 20).await {
            warn!(tenant_id = %tenant_id, error = %err, "Outbox dispatch failed; tasks remain queued");
        }
    }

    /// Run one task's side effect.
    async fn execute_task(&self, task: &OutboxTask) -> Result<(), AppError> {
        let kind = task
            .parsed_kind()
            .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Unknown task kind: {}", task.kind)))?;

        match kind {
            OutboxKind::ConnectionCommission => {
                self.post_connection_commission(task.tenant_id, task.reference_id)
                    .await
            }
            OutboxKind::ComplaintCommission => {
                self.post_complaint_commission(task.tenant_id, task.reference_id)
                    .await
            }
        }
    }

    /// Commission for the technician of the customer whose invoice settled.
    /// No configured commission means no entry; the task still completes.
    async fn post_connection_commission(
        &self,
        tenant_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<(), AppError> {
        let row: Option<(Option<Uuid>,)> = sqlx::query_as(
            r#"
            SELECT c.assigned_employee_id
            FROM invoices i
            JOIN customers c ON c.customer_id = i.customer_id
            WHERE i.tenant_id = $1 AND i.invoice_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(invoice_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load invoice: {}", e)))?;

        let employee_id = match row {
            Some((Some(employee_id),)) => employee_id,
            Some((None,)) => {
                info!(invoice_id = %invoice_id, "No technician assigned, no commission");
                return Ok(());
            }
            None => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Invoice {} not found for commission",
                    invoice_id
                )))
            }
        };

        let employee = self
            .get_employee(tenant_id, employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Employee not found")))?;

        if employee.connection_commission <= Decimal::ZERO {
            info!(
                employee_id = %employee_id,
                invoice_id = %invoice_id,
                "No connection commission configured"
            );
            return Ok(());
        }

        self.post_employee_entry(&PostLedgerEntry {
            tenant_id,
            employee_id,
            entry_type: LedgerEntryType::ConnectionCommission,
            amount: employee.connection_commission,
            description: Some("connection commission".to_string()),
            reference_id: Some(invoice_id),
        })
        .await?;

        Ok(())
    }

    /// Commission for the employee who resolved a complaint.
    async fn post_complaint_commission(
        &self,
        tenant_id: Uuid,
        complaint_id: Uuid,
    ) -> Result<(), AppError> {
        let row: Option<(Option<Uuid>,)> = sqlx::query_as(
            "SELECT assigned_employee_id FROM complaints WHERE tenant_id = $1 AND complaint_id = $2",
        )
        .bind(tenant_id)
        .bind(complaint_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load complaint: {}", e)))?;

        let employee_id = match row {
            Some((Some(employee_id),)) => employee_id,
            Some((None,)) => {
                info!(complaint_id = %complaint_id, "No employee assigned, no commission");
                return Ok(());
            }
            None => {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Complaint {} not found for commission",
                    complaint_id
                )))
            }
        };

        let employee = self
            .get_employee(tenant_id, employee_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Employee not found")))?;

        if employee.complaint_commission <= Decimal::ZERO {
            info!(
                employee_id = %employee_id,
                complaint_id = %complaint_id,
                "No complaint commission configured"
            );
            return Ok(());
        }

        self.post_employee_entry(&PostLedgerEntry {
            tenant_id,
            employee_id,
            entry_type: LedgerEntryType::ComplaintCommission,
            amount: employee.complaint_commission,
            description: Some("complaint resolution commission".to_string()),
            reference_id: Some(complaint_id),
        })
        .await?;

        Ok(())
    }

    async fn mark_task(
        &self,
        task: &OutboxTask,
        status: OutboxStatus,
        error: Option<String>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE outbox_tasks
            SET status = $1,
                attempts = attempts + 1,
                last_error = $2,
                processed_utc = CASE WHEN $1 <> 'pending' THEN NOW() ELSE processed_utc END
            WHERE task_id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(task.task_id)
        .execute(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update outbox task: {}", e)))?;
        Ok(())
    }

    /// List a tenant's outbox tasks, newest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_outbox_tasks(
        &self,
        tenant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<OutboxTask>, AppError> {
        let tasks = sqlx::query_as::<_, OutboxTask>(
            r#"
            SELECT task_id, tenant_id, kind, reference_id, status, attempts, last_error, created_utc, processed_utc
            FROM outbox_tasks
            WHERE tenant_id = $1
            ORDER BY created_utc DESC, task_id DESC
            LIMIT $2
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list outbox tasks: {}", e)))?;
        Ok(tasks)
    }
}

/// Enqueue a follow-up task inside the caller's transaction. Re-enqueueing
/// the same (kind, reference) is a no-op.
pub(crate) async fn enqueue_task(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    kind: OutboxKind,
    reference_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO outbox_tasks (task_id, tenant_id, kind, reference_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id, kind, reference_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(kind.as_str())
    .bind(reference_id)
    .execute(conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to enqueue outbox task: {}", e)))?;

    info!(kind = %kind, reference_id = %reference_id, "Outbox task enqueued");

    Ok(())
}
