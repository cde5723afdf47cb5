//! Database connection pool and shared lookups.

use crate::models::{Customer, CustomerPackage, Employee, ServicePlan};
use crate::services::metrics::DB_QUERY_DURATION;
use service_core::error::AppError;
use service_core::policy::CustomerScope;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper. Domain operations live in the sibling
/// modules as further `impl Database` blocks.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "settlement-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// Get a customer, honoring the caller's row scope.
    #[instrument(skip(self, scope), fields(tenant_id = %tenant_id, customer_id = %customer_id))]
    pub async fn get_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        scope: CustomerScope,
    ) -> Result<Option<Customer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, tenant_id, name, discount_percentage, recharge_day, assigned_employee_id, is_active, created_utc
            FROM customers
            WHERE tenant_id = $1 AND customer_id = $2
              AND ($3::uuid IS NULL OR assigned_employee_id = $3)
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .bind(scope.assigned_employee_filter())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        timer.observe_duration();

        Ok(customer)
    }

    /// Get an employee.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, employee_id = %employee_id))]
    pub async fn get_employee(
        &self,
        tenant_id: Uuid,
        employee_id: Uuid,
    ) -> Result<Option<Employee>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_employee"])
            .start_timer();

        let employee = sqlx::query_as::<_, Employee>(
            r#"
            SELECT employee_id, tenant_id, name, connection_commission, complaint_commission, current_balance, paid_amount, is_active, created_utc
            FROM employees
            WHERE tenant_id = $1 AND employee_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get employee: {}", e)))?;

        timer.observe_duration();

        Ok(employee)
    }
}

/// Fetch a customer's packages live at `as_of` with their plans, on any
/// executor so callers inside a transaction can reuse it. Backdated billing
/// runs pass their run date here; a package end-dated after that date still
/// counts for the period.
pub(crate) async fn active_packages<'e, E>(
    executor: E,
    tenant_id: Uuid,
    customer_id: Uuid,
    as_of: chrono::NaiveDate,
) -> Result<Vec<(CustomerPackage, ServicePlan)>, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let rows = sqlx::query_as::<_, PackageWithPlan>(
        r#"
        SELECT cp.package_id, cp.tenant_id, cp.customer_id, cp.plan_id, cp.start_date, cp.end_date, cp.is_active, cp.created_utc,
               sp.name AS plan_name, sp.monthly_price, sp.is_active AS plan_is_active, sp.created_utc AS plan_created_utc
        FROM customer_packages cp
        JOIN service_plans sp ON sp.plan_id = cp.plan_id
        WHERE cp.tenant_id = $1 AND cp.customer_id = $2 AND cp.is_active
          AND (cp.end_date IS NULL OR cp.end_date >= $3)
        ORDER BY cp.start_date, cp.package_id
        "#,
    )
    .bind(tenant_id)
    .bind(customer_id)
    .bind(as_of)
    .fetch_all(executor)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch packages: {}", e)))?;

    Ok(rows.into_iter().map(PackageWithPlan::split).collect())
}

#[derive(sqlx::FromRow)]
struct PackageWithPlan {
    package_id: Uuid,
    tenant_id: Uuid,
    customer_id: Uuid,
    plan_id: Uuid,
    start_date: chrono::NaiveDate,
    end_date: Option<chrono::NaiveDate>,
    is_active: bool,
    created_utc: chrono::DateTime<chrono::Utc>,
    plan_name: String,
    monthly_price: rust_decimal::Decimal,
    plan_is_active: bool,
    plan_created_utc: chrono::DateTime<chrono::Utc>,
}

impl PackageWithPlan {
    fn split(self) -> (CustomerPackage, ServicePlan) {
        (
            CustomerPackage {
                package_id: self.package_id,
                tenant_id: self.tenant_id,
                customer_id: self.customer_id,
                plan_id: self.plan_id,
                start_date: self.start_date,
                end_date: self.end_date,
                is_active: self.is_active,
                created_utc: self.created_utc,
            },
            ServicePlan {
                plan_id: self.plan_id,
                tenant_id: self.tenant_id,
                name: self.plan_name,
                monthly_price: self.monthly_price,
                is_active: self.plan_is_active,
                created_utc: self.plan_created_utc,
            },
        )
    }
}
