//! Complaint model. Resolution is the trigger for complaint commissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Complaint status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Closed => "closed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "in_progress" => ComplaintStatus::InProgress,
            "resolved" => ComplaintStatus::Resolved,
            "closed" => ComplaintStatus::Closed,
            _ => ComplaintStatus::Open,
        }
    }

    /// Only open or in-progress complaints may be resolved.
    pub fn can_resolve(&self) -> bool {
        matches!(self, ComplaintStatus::Open | ComplaintStatus::InProgress)
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Complaint row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Complaint {
    pub complaint_id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub assigned_employee_id: Option<Uuid>,
    pub status: String,
    pub subject: String,
    pub resolved_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl Complaint {
    pub fn parsed_status(&self) -> ComplaintStatus {
        ComplaintStatus::from_string(&self.status)
    }
}
