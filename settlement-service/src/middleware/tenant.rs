//! Tenant context extractor.
//!
//! The back-office gateway authenticates the caller and forwards their
//! identity in headers: `X-Tenant-ID` (the company), `X-Actor-Role` and,
//! for employees, `X-Actor-ID`. Every business route extracts this context;
//! requests without a valid tenant and role never reach a handler.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use service_core::policy::{AccessPolicy, Role};
use uuid::Uuid;

/// Caller identity for one request.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    /// The company every row in this request is scoped to.
    pub tenant_id: Uuid,
    /// Role of the acting user.
    pub role: Role,
    /// Employee identity of the acting user, when they have one.
    pub actor_employee_id: Option<Uuid>,
}

impl TenantContext {
    /// Resolve the caller's access policy.
    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy::new(self.role, self.actor_employee_id)
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header(parts, "X-Tenant-ID")
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-Tenant-ID header")))
            .and_then(|v| {
                Uuid::parse_str(v).map_err(|_| {
                    AppError::AuthError(anyhow::anyhow!("X-Tenant-ID is not a valid UUID"))
                })
            })?;

        let role = header(parts, "X-Actor-Role")
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing X-Actor-Role header")))
            .and_then(|v| {
                Role::parse(v)
                    .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Unknown actor role '{}'", v)))
            })?;

        let actor_employee_id = match header(parts, "X-Actor-ID") {
            Some(v) => Some(Uuid::parse_str(v).map_err(|_| {
                AppError::AuthError(anyhow::anyhow!("X-Actor-ID is not a valid UUID"))
            })?),
            None => None,
        };

        let span = tracing::Span::current();
        span.record("tenant_id", tracing::field::display(tenant_id));
        span.record("actor_role", role.as_str());

        Ok(TenantContext {
            tenant_id,
            role,
            actor_employee_id,
        })
    }
}
