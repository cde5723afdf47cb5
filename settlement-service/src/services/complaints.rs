//! Complaint resolution, the trigger for complaint commissions.

use crate::models::{Complaint, OutboxKind};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::outbox::enqueue_task;
use crate::services::Database;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Get a complaint.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, complaint_id = %complaint_id))]
    pub async fn get_complaint(
        &self,
        tenant_id: Uuid,
        complaint_id: Uuid,
    ) -> Result<Option<Complaint>, AppError> {
        let complaint = sqlx::query_as::<_, Complaint>(
            r#"
            SELECT complaint_id, tenant_id, customer_id, assigned_employee_id, status, subject, resolved_utc, created_utc
            FROM complaints
            WHERE tenant_id = $1 AND complaint_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(complaint_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get complaint: {}", e)))?;

        Ok(complaint)
    }

    /// Resolve a complaint. Enqueues the complaint commission follow-up in
    /// the same transaction and dispatches it after commit.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, complaint_id = %complaint_id))]
    pub async fn resolve_complaint(
        &self,
        tenant_id: Uuid,
        complaint_id: Uuid,
    ) -> Result<Complaint, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["resolve_complaint"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let complaint = sqlx::query_as::<_, Complaint>(
            r#"
            SELECT complaint_id, tenant_id, customer_id, assigned_employee_id, status, subject, resolved_utc, created_utc
            FROM complaints
            WHERE tenant_id = $1 AND complaint_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(complaint_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock complaint: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Complaint not found")))?;

        if !complaint.parsed_status().can_resolve() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Complaint is {} and cannot be resolved",
                complaint.status
            )));
        }

        let resolved = sqlx::query_as::<_, Complaint>(
            r#"
            UPDATE complaints SET status = 'resolved', resolved_utc = NOW()
            WHERE tenant_id = $1 AND complaint_id = $2
            RETURNING complaint_id, tenant_id, customer_id, assigned_employee_id, status, subject, resolved_utc, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(complaint_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve complaint: {}", e)))?;

        if resolved.assigned_employee_id.is_some() {
            enqueue_task(
                &mut tx,
                tenant_id,
                OutboxKind::ComplaintCommission,
                complaint_id,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(complaint_id = %complaint_id, "Complaint resolved");

        self.dispatch_outbox(tenant_id).await;

        Ok(resolved)
    }
}
