//! Recurring billing runs: idempotency, period math, discounts, roles.

mod common;

use common::{date, dec, spawn_app};
use reqwest::Method;
use serde_json::json;
use serial_test::serial;
use uuid::Uuid;

async fn run_billing(app: &common::TestApp, as_of: &str) -> serde_json::Value {
    let response = app
        .admin(Method::POST, "/billing-runs")
        .json(&json!({ "as_of": as_of }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

async fn subscription_invoices(app: &common::TestApp, customer_id: Uuid) -> Vec<(String, rust_decimal::Decimal)> {
    sqlx::query_as(
        "SELECT status, total_amount FROM invoices
         WHERE tenant_id = $1 AND customer_id = $2 AND invoice_type = 'subscription'
         ORDER BY created_utc",
    )
    .bind(app.tenant_id)
    .bind(customer_id)
    .fetch_all(&app.pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial]
async fn running_twice_generates_exactly_one_invoice_per_period() {
    let Some(app) = spawn_app().await else { return };

    let plan_id = app.seed_plan("fiber-100", "700").await;
    let customer_id = app.seed_customer("acme", 10, None).await;
    app.seed_package(customer_id, plan_id, date(2026, 6, 10)).await;

    let run = run_billing(&app, "2026-08-24").await;
    assert_eq!(run["status"], "completed");
    assert_eq!(run["customers_succeeded"], 1);
    assert_eq!(run["customers_failed"], 0);

    let invoices = subscription_invoices(&app, customer_id).await;
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].1, dec("700.00"));

    let period_start: chrono::NaiveDate = sqlx::query_scalar(
        "SELECT period_start FROM invoices WHERE tenant_id = $1 AND customer_id = $2",
    )
    .bind(app.tenant_id)
    .bind(customer_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(period_start, date(2026, 8, 10));

    // Second run for the same date skips instead of double-billing.
    let run = run_billing(&app, "2026-08-24").await;
    assert_eq!(run["customers_succeeded"], 0);
    assert_eq!(run["customers_skipped"], 1);
    assert_eq!(subscription_invoices(&app, customer_id).await.len(), 1);

    // A later cycle bills again.
    let run = run_billing(&app, "2026-09-24").await;
    assert_eq!(run["customers_succeeded"], 1);
    assert_eq!(subscription_invoices(&app, customer_id).await.len(), 2);
}

#[tokio::test]
#[serial]
async fn customer_discount_applies_to_generated_invoices() {
    let Some(app) = spawn_app().await else { return };

    let plan_id = app.seed_plan("fiber-100", "1000").await;
    let customer_id = app.seed_customer("acme", 5, None).await;
    sqlx::query("UPDATE customers SET discount_percentage = 10 WHERE customer_id = $1")
        .bind(customer_id)
        .execute(&app.pool)
        .await
        .unwrap();
    app.seed_package(customer_id, plan_id, date(2026, 7, 5)).await;

    run_billing(&app, "2026-08-20").await;

    let invoices = subscription_invoices(&app, customer_id).await;
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].1, dec("900.00"));
}

#[tokio::test]
#[serial]
async fn customers_without_active_packages_are_not_billed() {
    let Some(app) = spawn_app().await else { return };

    app.seed_customer("no-packages", 10, None).await;

    let run = run_billing(&app, "2026-08-24").await;
    assert_eq!(run["customers_processed"], 0);
}

#[tokio::test]
#[serial]
async fn backdated_runs_bill_packages_active_at_the_run_date() {
    let Some(app) = spawn_app().await else { return };

    let plan_id = app.seed_plan("fiber-100", "700").await;
    let customer_id = app.seed_customer("acme", 10, None).await;
    let package_id = app.seed_package(customer_id, plan_id, date(2026, 5, 10)).await;

    // Package was end-dated after the run date but before today. A backdated
    // run must still bill it for the period it was live.
    sqlx::query("UPDATE customer_packages SET end_date = $1 WHERE package_id = $2")
        .bind(date(2026, 7, 20))
        .bind(package_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let run = run_billing(&app, "2026-07-15").await;
    assert_eq!(run["customers_succeeded"], 1);
    assert_eq!(run["customers_failed"], 0);

    let invoices = subscription_invoices(&app, customer_id).await;
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].1, dec("700.00"));

    let period_start: chrono::NaiveDate = sqlx::query_scalar(
        "SELECT period_start FROM invoices WHERE tenant_id = $1 AND customer_id = $2",
    )
    .bind(app.tenant_id)
    .bind(customer_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(period_start, date(2026, 7, 10));
}

#[tokio::test]
#[serial]
async fn run_report_lists_per_customer_results() {
    let Some(app) = spawn_app().await else { return };

    let plan_id = app.seed_plan("fiber-100", "700").await;
    let customer_id = app.seed_customer("acme", 10, None).await;
    app.seed_package(customer_id, plan_id, date(2026, 6, 10)).await;

    let run = run_billing(&app, "2026-08-24").await;
    let run_id = run["run_id"].as_str().unwrap();

    let response = app
        .admin(Method::GET, &format!("/billing-runs/{}", run_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "invoiced");
    assert_eq!(
        results[0]["customer_id"].as_str().unwrap(),
        customer_id.to_string()
    );
}

#[tokio::test]
async fn technicians_cannot_start_billing_runs() {
    let Some(app) = spawn_app().await else { return };

    let response = app
        .request(Method::POST, "/billing-runs", "technician", None)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}
