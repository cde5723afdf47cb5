//! Shared integration-test harness.
//!
//! `spawn_app` binds the service on a random port against the database in
//! `TEST_DATABASE_URL` and yields a fresh tenant id, so tests isolate by
//! tenant instead of truncating tables. When the variable is unset the
//! tests skip instead of failing, matching environments without Postgres.

#![allow(dead_code)]

use chrono::NaiveDate;
use reqwest::Method;
use rust_decimal::Decimal;
use secrecy::Secret;
use settlement_service::config::{Config, DatabaseConfig};
use settlement_service::startup::Application;
use sqlx::PgPool;
use uuid::Uuid;

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub pool: PgPool,
    pub tenant_id: Uuid,
}

pub async fn spawn_app() -> Option<TestApp> {
    let url = match std::env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping integration test (TEST_DATABASE_URL is not set)");
            return None;
        }
    };

    let config = Config {
        server: service_core::config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        database: DatabaseConfig {
            url: Secret::new(url),
            max_connections: 5,
            min_connections: 1,
        },
        service_name: "settlement-service".to_string(),
    };

    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let address = format!("http://127.0.0.1:{}", app.port());
    let pool = app.db().pool().clone();
    tokio::spawn(app.run_until_stopped());

    Some(TestApp {
        address,
        client: reqwest::Client::new(),
        pool,
        tenant_id: Uuid::new_v4(),
    })
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("valid decimal")
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

impl TestApp {
    /// Request as an admin of the test tenant.
    pub fn admin(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.request(method, path, "admin", None)
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        role: &str,
        actor: Option<Uuid>,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.address, path))
            .header("X-Tenant-ID", self.tenant_id.to_string())
            .header("X-Actor-Role", role);
        if let Some(actor) = actor {
            builder = builder.header("X-Actor-ID", actor.to_string());
        }
        builder
    }

    pub async fn seed_employee(
        &self,
        name: &str,
        connection_commission: &str,
        complaint_commission: &str,
    ) -> Uuid {
        let employee_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO employees (employee_id, tenant_id, name, connection_commission, complaint_commission)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(employee_id)
        .bind(self.tenant_id)
        .bind(name)
        .bind(dec(connection_commission))
        .bind(dec(complaint_commission))
        .execute(&self.pool)
        .await
        .expect("Failed to seed employee");
        employee_id
    }

    pub async fn seed_plan(&self, name: &str, monthly_price: &str) -> Uuid {
        let plan_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO service_plans (plan_id, tenant_id, name, monthly_price) VALUES ($1, $2, $3, $4)",
        )
        .bind(plan_id)
        .bind(self.tenant_id)
        .bind(name)
        .bind(dec(monthly_price))
        .execute(&self.pool)
        .await
        .expect("Failed to seed plan");
        plan_id
    }

    pub async fn seed_bank_account(&self, name: &str) -> Uuid {
        let bank_account_id = Uuid::new_v4();
        sqlx::query("INSERT INTO bank_accounts (bank_account_id, tenant_id, name) VALUES ($1, $2, $3)")
            .bind(bank_account_id)
            .bind(self.tenant_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .expect("Failed to seed bank account");
        bank_account_id
    }

    pub async fn seed_inventory_item(&self, name: &str, unit_price: &str, quantity: i32) -> Uuid {
        let item_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO inventory_items (item_id, tenant_id, name, unit_price, quantity_on_hand)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(item_id)
        .bind(self.tenant_id)
        .bind(name)
        .bind(dec(unit_price))
        .bind(quantity)
        .execute(&self.pool)
        .await
        .expect("Failed to seed inventory item");
        item_id
    }

    pub async fn seed_customer(
        &self,
        name: &str,
        recharge_day: i32,
        assigned_employee_id: Option<Uuid>,
    ) -> Uuid {
        let customer_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO customers (customer_id, tenant_id, name, recharge_day, assigned_employee_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(customer_id)
        .bind(self.tenant_id)
        .bind(name)
        .bind(recharge_day)
        .bind(assigned_employee_id)
        .execute(&self.pool)
        .await
        .expect("Failed to seed customer");
        customer_id
    }

    pub async fn seed_package(&self, customer_id: Uuid, plan_id: Uuid, start: NaiveDate) -> Uuid {
        let package_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO customer_packages (package_id, tenant_id, customer_id, plan_id, start_date)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(package_id)
        .bind(self.tenant_id)
        .bind(customer_id)
        .bind(plan_id)
        .bind(start)
        .execute(&self.pool)
        .await
        .expect("Failed to seed package");
        package_id
    }

    pub async fn seed_complaint(&self, customer_id: Uuid, assigned_employee_id: Option<Uuid>) -> Uuid {
        let complaint_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO complaints (complaint_id, tenant_id, customer_id, assigned_employee_id, subject)
             VALUES ($1, $2, $3, $4, 'no connectivity')",
        )
        .bind(complaint_id)
        .bind(self.tenant_id)
        .bind(customer_id)
        .bind(assigned_employee_id)
        .execute(&self.pool)
        .await
        .expect("Failed to seed complaint");
        complaint_id
    }

    /// Create an ad-hoc invoice for a fixed amount through the API and
    /// return its id.
    pub async fn create_invoice(&self, customer_id: Uuid, amount: &str, due: NaiveDate) -> Uuid {
        let response = self
            .admin(Method::POST, "/invoices")
            .json(&serde_json::json!({
                "customer_id": customer_id,
                "due_date": due,
                "line_items": [
                    { "description": "service charge", "quantity": "1", "unit_price": amount }
                ]
            }))
            .send()
            .await
            .expect("Failed to create invoice");
        assert_eq!(response.status(), 201, "invoice creation failed");
        let body: serde_json::Value = response.json().await.expect("invalid invoice body");
        body["invoice_id"]
            .as_str()
            .and_then(|s| Uuid::parse_str(s).ok())
            .expect("missing invoice_id")
    }

    /// Record a payment through the API, returning (status code, body).
    pub async fn pay(
        &self,
        invoice_id: Uuid,
        amount: &str,
        status: &str,
    ) -> (reqwest::StatusCode, serde_json::Value) {
        let response = self
            .admin(Method::POST, "/payments")
            .json(&serde_json::json!({
                "invoice_id": invoice_id,
                "amount": amount,
                "method": "cash",
                "status": status
            }))
            .send()
            .await
            .expect("Failed to post payment");
        let code = response.status();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (code, body)
    }

    pub async fn stored_invoice_status(&self, invoice_id: Uuid) -> String {
        sqlx::query_scalar("SELECT status FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read invoice status")
    }

    pub async fn bank_balance(&self, bank_account_id: Uuid) -> Decimal {
        sqlx::query_scalar("SELECT current_balance FROM bank_accounts WHERE bank_account_id = $1")
            .bind(bank_account_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read bank balance")
    }

    pub async fn employee_balance(&self, employee_id: Uuid) -> Decimal {
        sqlx::query_scalar("SELECT current_balance FROM employees WHERE employee_id = $1")
            .bind(employee_id)
            .fetch_one(&self.pool)
            .await
            .expect("Failed to read employee balance")
    }

    pub async fn ledger_entries(&self, employee_id: Uuid) -> Vec<(String, Decimal)> {
        sqlx::query_as(
            "SELECT entry_type, amount FROM employee_ledger
             WHERE tenant_id = $1 AND employee_id = $2
             ORDER BY posted_utc",
        )
        .bind(self.tenant_id)
        .bind(employee_id)
        .fetch_all(&self.pool)
        .await
        .expect("Failed to read ledger entries")
    }
}
