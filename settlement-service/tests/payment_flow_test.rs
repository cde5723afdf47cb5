//! Payment application flows: partial settlement, over-payment rejection,
//! deletion and the commission that rides on full settlement.

mod common;

use common::{date, dec, spawn_app};
use reqwest::Method;

#[tokio::test]
async fn partial_then_full_payment_settles_invoice_and_pays_one_commission() {
    let Some(app) = spawn_app().await else { return };

    let employee_id = app.seed_employee("tech", "200", "0").await;
    let customer_id = app.seed_customer("acme", 10, Some(employee_id)).await;
    let invoice_id = app.create_invoice(customer_id, "1000", date(2026, 9, 30)).await;

    let (code, _) = app.pay(invoice_id, "400", "paid").await;
    assert_eq!(code, 201);
    assert_eq!(app.stored_invoice_status(invoice_id).await, "partially_paid");

    let (code, _) = app.pay(invoice_id, "600", "paid").await;
    assert_eq!(code, 201);
    assert_eq!(app.stored_invoice_status(invoice_id).await, "paid");

    let entries = app.ledger_entries(employee_id).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "connection_commission");
    assert_eq!(entries[0].1, dec("200"));
    assert_eq!(app.employee_balance(employee_id).await, dec("200"));

    // Draining the outbox again must not double-post the commission.
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
async fn overpayment_is_rejected_and_nothing_is_committed() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let invoice_id = app.create_invoice(customer_id, "1000", date(2026, 9, 30)).await;

    let (code, _) = app.pay(invoice_id, "500", "paid").await;
    assert_eq!(code, 201);

    let (code, body) = app.pay(invoice_id, "700", "paid").await;
    assert_eq!(code, 400);
    let message = body["error"].as_str().unwrap_or_default();
    assert!(
        message.contains("exceeds invoice balance"),
        "unexpected error: {}",
        message
    );

    assert_eq!(app.stored_invoice_status(invoice_id).await, "partially_paid");
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE invoice_id = $1")
            .bind(invoice_id)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn exact_settlement_to_the_cent_is_accepted() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let invoice_id = app.create_invoice(customer_id, "499.99", date(2026, 9, 30)).await;

    let (code, _) = app.pay(invoice_id, "499.99", "paid").await;
    assert_eq!(code, 201);
    assert_eq!(app.stored_invoice_status(invoice_id).await, "paid");
}

#[tokio::test]
async fn deleting_the_last_payment_returns_the_invoice_to_pending() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let invoice_id = app.create_invoice(customer_id, "1000", date(2026, 9, 30)).await;

    let (code, body) = app.pay(invoice_id, "1000", "paid").await;
    assert_eq!(code, 201);
    assert_eq!(app.stored_invoice_status(invoice_id).await, "paid");
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    let response = app
        .admin(Method::DELETE, &format!("/payments/{}", payment_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["invoice_status"], "pending");
    assert_eq!(app.stored_invoice_status(invoice_id).await, "pending");
}

#[tokio::test]
async fn managers_cannot_hard_delete_payments() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let invoice_id = app.create_invoice(customer_id, "100", date(2026, 9, 30)).await;
    let (_, body) = app.pay(invoice_id, "100", "paid").await;
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    let response = app
        .request(Method::DELETE, &format!("/payments/{}", payment_id), "manager", None)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}
