//! Outbox task model.
//!
//! Side effects of a settled payment or resolved complaint (commission
//! posting) are enqueued in the same transaction as the primary write and
//! dispatched after commit. A dispatch failure leaves the task pending for
//! retry; the primary write is never rolled back for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Maximum dispatch attempts before a task is parked as failed.
pub const MAX_OUTBOX_ATTEMPTS: i32 = 5;

/// What the queued follow-up does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    ConnectionCommission,
    ComplaintCommission,
}

impl OutboxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::ConnectionCommission => "connection_commission",
            OutboxKind::ComplaintCommission => "complaint_commission",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "connection_commission" => Some(OutboxKind::ConnectionCommission),
            "complaint_commission" => Some(OutboxKind::ComplaintCommission),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Done,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Done => "done",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "done" => OutboxStatus::Done,
            "failed" => OutboxStatus::Failed,
            _ => OutboxStatus::Pending,
        }
    }
}

/// Outbox row. Unique per (tenant, kind, reference), so re-enqueueing the
/// same trigger is a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxTask {
    pub task_id: Uuid,
    pub tenant_id: Uuid,
    pub kind: String,
    pub reference_id: Uuid,
    pub status: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub processed_utc: Option<DateTime<Utc>>,
}

impl OutboxTask {
    pub fn parsed_kind(&self) -> Option<OutboxKind> {
        OutboxKind::from_string(&self.kind)
    }

    pub fn parsed_status(&self) -> OutboxStatus {
        OutboxStatus::from_string(&self.status)
    }
}
