//! Ledger invariants: bank balances move only through transactions, employee
//! balances always equal the sum of their ledger entries.

mod common;

use common::{date, dec, spawn_app};
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn bank_transfer_payments_credit_and_voiding_reverses() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let bank_account_id = app.seed_bank_account("operations").await;
    let invoice_id = app.create_invoice(customer_id, "1000", date(2026, 9, 30)).await;

    let response = app
        .admin(Method::POST, "/payments")
        .json(&json!({
            "invoice_id": invoice_id,
            "amount": "300",
            "method": "bank_transfer",
            "bank_account_id": bank_account_id
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    assert_eq!(app.bank_balance(bank_account_id).await, dec("300"));

    let response = app
        .admin(Method::POST, &format!("/payments/{}/void", payment_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(app.bank_balance(bank_account_id).await, dec("0"));
    assert_eq!(app.stored_invoice_status(invoice_id).await, "pending");

    // Both movements are on the books: the credit and its reversal.
    let directions: Vec<(String, Decimal)> = sqlx::query_as(
        "SELECT direction, amount FROM bank_transactions
         WHERE tenant_id = $1 AND bank_account_id = $2
         ORDER BY posted_utc",
    )
    .bind(app.tenant_id)
    .bind(bank_account_id)
    .fetch_all(&app.pool)
    .await
    .unwrap();
    assert_eq!(directions.len(), 2);
    assert_eq!(directions[0].0, "credit");
    assert_eq!(directions[1].0, "debit");

    // Voiding twice conflicts.
    let response = app
        .admin(Method::POST, &format!("/payments/{}/void", payment_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn bank_account_endpoints_report_balance_and_history() {
    let Some(app) = spawn_app().await else { return };

    let customer_id = app.seed_customer("acme", 10, None).await;
    let bank_account_id = app.seed_bank_account("operations").await;
    let invoice_id = app.create_invoice(customer_id, "1000", date(2026, 9, 30)).await;

    app.admin(Method::POST, "/payments")
        .json(&json!({
            "invoice_id": invoice_id,
            "amount": "250",
            "method": "bank_transfer",
            "bank_account_id": bank_account_id
        }))
        .send()
        .await
        .unwrap();

    let response = app
        .admin(Method::GET, &format!("/bank-accounts/{}", bank_account_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["current_balance"].as_str().unwrap().parse::<Decimal>().unwrap(),
        dec("250")
    );

    let response = app
        .admin(
            Method::GET,
            &format!("/bank-accounts/{}/transactions", bank_account_id),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn employee_balance_equals_the_sum_of_ledger_entries() {
    let Some(app) = spawn_app().await else { return };

    let employee_id = app.seed_employee("tech", "200", "150").await;
    let customer_id = app.seed_customer("acme", 10, Some(employee_id)).await;

    // Two commissions: one connection, one complaint.
    let invoice_id = app.create_invoice(customer_id, "500", date(2026, 9, 30)).await;
    app.pay(invoice_id, "500", "paid").await;
    let complaint_id = app.seed_complaint(customer_id, Some(employee_id)).await;
    app.admin(Method::POST, &format!("/complaints/{}/resolve", complaint_id))
        .send()
        .await
        .unwrap();

    let entries = app.ledger_entries(employee_id).await;
    let total: Decimal = entries.iter().map(|(_, amount)| *amount).sum();
    assert_eq!(total, dec("350"));
    assert_eq!(app.employee_balance(employee_id).await, total);

    // The statement endpoint reports the same picture, running balance last.
    let response = app
        .admin(Method::GET, &format!("/employees/{}/ledger", employee_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["current_balance"].as_str().unwrap().parse::<Decimal>().unwrap(),
        dec("350")
    );
    let lines = body["entries"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines
            .last()
            .unwrap()["running_balance"]
            .as_str()
            .unwrap()
            .parse::<Decimal>()
            .unwrap(),
        dec("350")
    );

    let response = app
        .admin(Method::GET, &format!("/employees/{}/balance", employee_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body["current_balance"].as_str().unwrap().parse::<Decimal>().unwrap(),
        dec("350")
    );
}
