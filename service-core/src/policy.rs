//! Role policy layer.
//!
//! Back-office callers act under a role. Instead of branching on the role
//! string inside every query function, a request resolves its role to an
//! [`AccessPolicy`] once; query builders consume the resulting scope and
//! handlers consume the capability checks.

use crate::error::AppError;
use uuid::Uuid;

/// Capability constants, one per guarded operation.
pub mod capabilities {
    /// Onboard customers (packages, equipment issue).
    pub const CUSTOMER_ONBOARD: &str = "customer:onboard";

    /// Create ad-hoc invoices.
    pub const INVOICE_CREATE: &str = "invoice:create";

    /// Cancel or delete invoices.
    pub const INVOICE_CANCEL: &str = "invoice:cancel";

    /// Record payments against invoices.
    pub const PAYMENT_CREATE: &str = "payment:create";

    /// Approve or reject pending payments.
    pub const PAYMENT_VERIFY: &str = "payment:verify";

    /// Void or hard-delete payments.
    pub const PAYMENT_DELETE: &str = "payment:delete";

    /// Resolve complaints.
    pub const COMPLAINT_RESOLVE: &str = "complaint:resolve";

    /// Start recurring billing runs.
    pub const BILLING_RUN: &str = "billing:run";

    /// Drain the side-effect outbox.
    pub const OUTBOX_RUN: &str = "outbox:run";

    /// Read employee ledgers and bank accounts.
    pub const LEDGER_READ: &str = "ledger:read";
}

/// Caller role, parsed from the `X-Actor-Role` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Manager,
    Technician,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "technician" => Some(Self::Technician),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Technician => "technician",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which customers (and their invoices/payments) a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerScope {
    /// Every customer of the tenant.
    All,
    /// Only customers assigned to this employee.
    AssignedTo(Uuid),
}

impl CustomerScope {
    /// Employee filter for query builders; `None` means unrestricted.
    pub fn assigned_employee_filter(&self) -> Option<Uuid> {
        match self {
            Self::All => None,
            Self::AssignedTo(employee_id) => Some(*employee_id),
        }
    }
}

/// Resolved access policy for one request.
#[derive(Debug, Clone, Copy)]
pub struct AccessPolicy {
    role: Role,
    actor_employee_id: Option<Uuid>,
}

impl AccessPolicy {
    pub fn new(role: Role, actor_employee_id: Option<Uuid>) -> Self {
        Self {
            role,
            actor_employee_id,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn actor_employee_id(&self) -> Option<Uuid> {
        self.actor_employee_id
    }

    /// Row visibility for customer-owned records.
    pub fn customer_scope(&self) -> CustomerScope {
        match (self.role, self.actor_employee_id) {
            (Role::Technician, Some(employee_id)) => CustomerScope::AssignedTo(employee_id),
            // A technician without an employee identity sees nothing useful,
            // but read endpoints still 404 per-record, so fall back to the
            // impossible filter of the nil employee.
            (Role::Technician, None) => CustomerScope::AssignedTo(Uuid::nil()),
            _ => CustomerScope::All,
        }
    }

    pub fn allows(&self, capability: &str) -> bool {
        use capabilities::*;
        match self.role {
            Role::Admin => true,
            // Hard deletion of money records stays with admins.
            Role::Manager => capability != PAYMENT_DELETE,
            Role::Technician => matches!(capability, COMPLAINT_RESOLVE | PAYMENT_CREATE),
        }
    }

    /// Capability check, `Forbidden` on failure.
    pub fn require(&self, capability: &str) -> Result<(), AppError> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "role '{}' may not perform {}",
                self.role,
                capability
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_passes_every_capability() {
        let policy = AccessPolicy::new(Role::Admin, None);
        for cap in [
            capabilities::CUSTOMER_ONBOARD,
            capabilities::PAYMENT_DELETE,
            capabilities::BILLING_RUN,
        ] {
            assert!(policy.allows(cap));
        }
    }

    #[test]
    fn technician_is_scoped_to_assigned_customers() {
        let employee_id = Uuid::new_v4();
        let policy = AccessPolicy::new(Role::Technician, Some(employee_id));
        assert_eq!(
            policy.customer_scope().assigned_employee_filter(),
            Some(employee_id)
        );
        assert!(policy.allows(capabilities::COMPLAINT_RESOLVE));
        assert!(!policy.allows(capabilities::PAYMENT_VERIFY));
        assert!(!policy.allows(capabilities::BILLING_RUN));
    }

    #[test]
    fn manager_sees_all_customers() {
        let policy = AccessPolicy::new(Role::Manager, Some(Uuid::new_v4()));
        assert_eq!(policy.customer_scope(), CustomerScope::All);
        assert!(policy.allows(capabilities::PAYMENT_VERIFY));
        assert!(!policy.allows(capabilities::PAYMENT_DELETE));
    }

    #[test]
    fn unknown_role_string_is_rejected() {
        assert!(Role::parse("superuser").is_none());
        assert_eq!(Role::parse("manager"), Some(Role::Manager));
    }
}
