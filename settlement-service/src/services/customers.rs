//! Customer onboarding: customer, packages, first subscription invoice and
//! the one-off equipment invoice, all in a single transaction.

use crate::models::{
    billing_period_for, CreateInvoice, CreateLineItem, Customer, Invoice, InvoiceType,
    OnboardCustomer,
};
use crate::services::invoices::insert_invoice;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::Database;
use chrono::Days;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

const SUBSCRIPTION_DUE_DAYS: u64 = 15;
const EQUIPMENT_DUE_DAYS: u64 = 7;

/// Result of onboarding: the customer and the invoices raised for them.
#[derive(Debug, Clone)]
pub struct OnboardResult {
    pub customer: Customer,
    pub subscription_invoice: Option<Invoice>,
    pub equipment_invoice: Option<Invoice>,
}

impl Database {
    /// Onboard a customer.
    ///
    /// Fails closed: insufficient stock for any issued equipment aborts the
    /// whole onboarding, customer included.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, name = %input.name))]
    pub async fn onboard_customer(&self, input: &OnboardCustomer) -> Result<OnboardResult, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["onboard_customer"])
            .start_timer();

        if !(1..=28).contains(&input.recharge_day) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Recharge day must be between 1 and 28"
            )));
        }
        if input.plan_ids.is_empty() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "At least one service plan is required"
            )));
        }

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let customer_id = Uuid::new_v4();
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (customer_id, tenant_id, name, discount_percentage, recharge_day, assigned_employee_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING customer_id, tenant_id, name, discount_percentage, recharge_day, assigned_employee_id, is_active, created_utc
            "#,
        )
        .bind(customer_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.discount_percentage)
        .bind(input.recharge_day)
        .bind(input.assigned_employee_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert customer: {}", e)))?;

        // Subscribe to each plan and price the first cycle.
        let mut subscription_items = Vec::with_capacity(input.plan_ids.len());
        let mut subtotal = Decimal::ZERO;
        for plan_id in &input.plan_ids {
            let plan: Option<(String, Decimal)> = sqlx::query_as(
                r#"
                SELECT name, monthly_price FROM service_plans
                WHERE tenant_id = $1 AND plan_id = $2 AND is_active
                "#,
            )
            .bind(input.tenant_id)
            .bind(plan_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch plan: {}", e)))?;

            let (plan_name, monthly_price) = plan.ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!("Service plan {} not found", plan_id))
            })?;

            let package_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO customer_packages (package_id, tenant_id, customer_id, plan_id, start_date)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(package_id)
            .bind(input.tenant_id)
            .bind(customer_id)
            .bind(plan_id)
            .bind(input.join_date)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert package: {}", e))
            })?;

            subtotal += monthly_price;
            subscription_items.push(CreateLineItem {
                description: plan_name,
                package_id: Some(package_id),
                inventory_item_id: None,
                quantity: Decimal::ONE,
                unit_price: monthly_price,
                discount: Decimal::ZERO,
            });
        }

        let period = billing_period_for(input.recharge_day as u32, input.join_date);
        let subscription_invoice = insert_invoice(
            &mut tx,
            &CreateInvoice {
                tenant_id: input.tenant_id,
                customer_id,
                invoice_type: InvoiceType::Subscription,
                period_start: Some(period.start),
                period_end: Some(period.end),
                due_date: period
                    .start
                    .checked_add_days(Days::new(SUBSCRIPTION_DUE_DAYS))
                    .unwrap_or(period.end),
                subtotal,
                discount_percentage: input.discount_percentage,
                notes: None,
                line_items: subscription_items,
            },
        )
        .await?;

        let equipment_invoice = if input.equipment.is_empty() {
            None
        } else {
            Some(issue_equipment(&mut tx, input, customer_id).await?)
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            customer_id = %customer_id,
            subscription_invoice = %subscription_invoice.invoice_number,
            equipment_invoice = ?equipment_invoice.as_ref().map(|i| i.invoice_number.clone()),
            "Customer onboarded"
        );

        Ok(OnboardResult {
            customer,
            subscription_invoice: Some(subscription_invoice),
            equipment_invoice,
        })
    }
}

/// Deduct stock for each issued item and raise the one-off equipment
/// invoice. A shortfall on any item errors out, rolling back the caller's
/// transaction.
async fn issue_equipment(
    conn: &mut PgConnection,
    input: &OnboardCustomer,
    customer_id: Uuid,
) -> Result<Invoice, AppError> {
    let mut line_items = Vec::with_capacity(input.equipment.len());
    let mut subtotal = Decimal::ZERO;
    let mut deducted = Vec::with_capacity(input.equipment.len());

    for issue in &input.equipment {
        if issue.quantity <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Equipment quantity must be positive"
            )));
        }

        let item: Option<(String, Decimal)> = sqlx::query_as(
            r#"
            UPDATE inventory_items
            SET quantity_on_hand = quantity_on_hand - $1
            WHERE tenant_id = $2 AND item_id = $3 AND quantity_on_hand >= $1
            RETURNING name, unit_price
            "#,
        )
        .bind(issue.quantity)
        .bind(input.tenant_id)
        .bind(issue.item_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to deduct stock: {}", e)))?;

        let (name, unit_price) = item.ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Insufficient stock for item {}",
                issue.item_id
            ))
        })?;

        let quantity = Decimal::from(issue.quantity);
        subtotal += (quantity * unit_price).round_dp(2);
        line_items.push(CreateLineItem {
            description: name,
            package_id: None,
            inventory_item_id: Some(issue.item_id),
            quantity,
            unit_price,
            discount: Decimal::ZERO,
        });
        deducted.push(issue);
    }

    let invoice = insert_invoice(
        &mut *conn,
        &CreateInvoice {
            tenant_id: input.tenant_id,
            customer_id,
            invoice_type: InvoiceType::Equipment,
            period_start: None,
            period_end: None,
            due_date: input
                .join_date
                .checked_add_days(Days::new(EQUIPMENT_DUE_DAYS))
                .unwrap_or(input.join_date),
            subtotal,
            discount_percentage: Decimal::ZERO,
            notes: Some("equipment issued at connection".to_string()),
            line_items,
        },
    )
    .await?;

    // Stock movements reference the invoice they were billed on.
    for issue in deducted {
        sqlx::query(
            r#"
            INSERT INTO inventory_transactions (transaction_id, tenant_id, item_id, change, reason, reference_id)
            VALUES ($1, $2, $3, $4, 'connection_issue', $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(issue.item_id)
        .bind(-issue.quantity)
        .bind(invoice.invoice_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record stock movement: {}", e))
        })?;
    }

    Ok(invoice)
}
