//! Commission triggers: connection commission on settlement, complaint
//! commission on resolution, zero-commission employees, idempotency.

mod common;

use common::{date, dec, spawn_app};
use reqwest::Method;

#[tokio::test]
async fn zero_commission_employees_get_no_ledger_entry() {
    let Some(app) = spawn_app().await else { return };

    let employee_id = app.seed_employee("tech", "0", "0").await;
    let customer_id = app.seed_customer("acme", 10, Some(employee_id)).await;
    let invoice_id = app.create_invoice(customer_id, "300", date(2026, 9, 30)).await;

    let (code, _) = app.pay(invoice_id, "300", "paid").await;
    assert_eq!(code, 201);
    assert_eq!(app.stored_invoice_status(invoice_id).await, "paid");

    assert!(app.ledger_entries(employee_id).await.is_empty());
    assert_eq!(app.employee_balance(employee_id).await, dec("0"));

    // The task still completed rather than lingering as pending.
    let pending: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox_tasks WHERE tenant_id = $1 AND status = 'pending'",
    )
    .bind(app.tenant_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(pending, 0);
}

#[tokio::test]
async fn unassigned_customers_settle_without_commission() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let invoice_id = app.create_invoice(customer_id, "300", date(2026, 9, 30)).await;

    let (code, _) = app.pay(invoice_id, "300", "paid").await;
    assert_eq!(code, 201);

    let entries: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM employee_ledger WHERE tenant_id = $1")
            .bind(app.tenant_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(entries, 0);
}

#[tokio::test]
async fn resolving_a_complaint_pays_the_assignee_once() {
    let Some(app) = spawn_app().await else { return };

    let employee_id = app.seed_employee("tech", "0", "150").await;
    let customer_id = app.seed_customer("acme", 10, Some(employee_id)).await;
    let complaint_id = app.seed_complaint(customer_id, Some(employee_id)).await;

    let response = app
        .request(
            Method::POST,
            &format!("/complaints/{}/resolve", complaint_id),
            "technician",
            Some(employee_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "resolved");

    let entries = app.ledger_entries(employee_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "complaint_commission");
    assert_eq!(entries[0].1, dec("150"));
    assert_eq!(app.employee_balance(employee_id).await, dec("150"));

    // Resolving again conflicts; draining the outbox again posts nothing.
    let response = app
        .admin(Method::POST, &format!("/complaints/{}/resolve", complaint_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let response = app
        .admin(Method::POST, "/outbox/run")
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(app.ledger_entries(employee_id).await.len(), 1);
}

#[tokio::test]
async fn unassigned_complaints_resolve_without_commission() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let complaint_id = app.seed_complaint(customer_id, None).await;

    let response = app
        .admin(Method::POST, &format!("/complaints/{}/resolve", complaint_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox_tasks WHERE tenant_id = $1")
        .bind(app.tenant_id)
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(tasks, 0);
}
