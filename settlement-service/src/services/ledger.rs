//! Ledger primitives: employee ledger entries and bank transactions.
//!
//! Both cached balances (`employees.current_balance`,
//! `bank_accounts.current_balance`) are written only here, inside the same
//! transaction as the row insert and under a row lock on the owner record.

use crate::models::{
    BankAccount, BankDirection, BankSource, BankTransaction, EmployeeLedgerEntry, LedgerEntryType,
    PostLedgerEntry,
};
use crate::services::metrics::{COMMISSIONS_POSTED, DB_QUERY_DURATION};
use crate::services::Database;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::PgConnection;
use tracing::{info, instrument};
use uuid::Uuid;

impl Database {
    /// Post an employee ledger entry in its own transaction.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, employee_id = %input.employee_id, entry_type = %input.entry_type))]
    pub async fn post_employee_entry(
        &self,
        input: &PostLedgerEntry,
    ) -> Result<Option<EmployeeLedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["post_employee_entry"])
            .start_timer();

        let mut tx = self.pool().begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let entry = post_employee_entry(&mut tx, input).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(entry)
    }

    /// Employee ledger entries, oldest first, with a running balance.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, employee_id = %employee_id))]
    pub async fn get_employee_statement(
        &self,
        tenant_id: Uuid,
        employee_id: Uuid,
    ) -> Result<Option<(Decimal, Vec<(EmployeeLedgerEntry, Decimal)>)>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_employee_statement"])
            .start_timer();

        let employee = self.get_employee(tenant_id, employee_id).await?;
        let employee = match employee {
            Some(e) => e,
            None => return Ok(None),
        };

        let entries = sqlx::query_as::<_, EmployeeLedgerEntry>(
            r#"
            SELECT entry_id, tenant_id, employee_id, entry_type, amount, description, reference_id, posted_utc
            FROM employee_ledger
            WHERE tenant_id = $1 AND employee_id = $2
            ORDER BY posted_utc, entry_id
            "#,
        )
        .bind(tenant_id)
        .bind(employee_id)
        .fetch_all(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get ledger entries: {}", e)))?;

        let mut running = Decimal::ZERO;
        let lines = entries
            .into_iter()
            .map(|entry| {
                running += entry.amount;
                (entry, running)
            })
            .collect();

        timer.observe_duration();

        Ok(Some((employee.current_balance, lines)))
    }

    /// Get a bank account.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, bank_account_id = %bank_account_id))]
    pub async fn get_bank_account(
        &self,
        tenant_id: Uuid,
        bank_account_id: Uuid,
    ) -> Result<Option<BankAccount>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_bank_account"])
            .start_timer();

        let account = sqlx::query_as::<_, BankAccount>(
            r#"
            SELECT bank_account_id, tenant_id, name, initial_balance, current_balance, created_utc
            FROM bank_accounts
            WHERE tenant_id = $1 AND bank_account_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(bank_account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get bank account: {}", e)))?;

        timer.observe_duration();

        Ok(account)
    }

    /// List a bank account's transactions, most recent first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, bank_account_id = %bank_account_id))]
    pub async fn list_bank_transactions(
        &self,
        tenant_id: Uuid,
        bank_account_id: Uuid,
        page_size: i32,
    ) -> Result<Vec<BankTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_bank_transactions"])
            .start_timer();

        let limit = page_size.clamp(1, 200) as i64;

        let transactions = sqlx::query_as::<_, BankTransaction>(
            r#"
            SELECT transaction_id, tenant_id, bank_account_id, direction, amount, source_type,
                   reference_id, description, posted_utc
            FROM bank_transactions
            WHERE tenant_id = $1 AND bank_account_id = $2
            ORDER BY posted_utc DESC, transaction_id DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(bank_account_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list bank transactions: {}", e))
        })?;

        timer.observe_duration();

        Ok(transactions)
    }
}

/// Insert an employee ledger entry and adjust the cached balance, inside the
/// caller's transaction.
///
/// Commission entry types are idempotent per (type, reference): a duplicate
/// insert is a no-op and returns `None`, leaving the balance untouched.
pub(crate) async fn post_employee_entry(
    conn: &mut PgConnection,
    input: &PostLedgerEntry,
) -> Result<Option<EmployeeLedgerEntry>, AppError> {
    if input.amount == Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Ledger entry amount must not be zero"
        )));
    }

    // Lock the owner row so the balance adjustment serializes with any
    // concurrent posting for the same employee.
    let locked: Option<Uuid> = sqlx::query_scalar(
        "SELECT employee_id FROM employees WHERE tenant_id = $1 AND employee_id = $2 FOR UPDATE",
    )
    .bind(input.tenant_id)
    .bind(input.employee_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock employee: {}", e)))?;

    if locked.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Employee not found")));
    }

    let entry = if input.entry_type.is_commission() {
        sqlx::query_as::<_, EmployeeLedgerEntry>(
            r#"
            INSERT INTO employee_ledger (entry_id, tenant_id, employee_id, entry_type, amount, description, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id, entry_type, reference_id) WHERE entry_type IN ('connection_commission', 'complaint_commission')
            DO NOTHING
            RETURNING entry_id, tenant_id, employee_id, entry_type, amount, description, reference_id, posted_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.employee_id)
        .bind(input.entry_type.as_str())
        .bind(input.amount)
        .bind(&input.description)
        .bind(input.reference_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert ledger entry: {}", e)))?
    } else {
        let entry = sqlx::query_as::<_, EmployeeLedgerEntry>(
            r#"
            INSERT INTO employee_ledger (entry_id, tenant_id, employee_id, entry_type, amount, description, reference_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING entry_id, tenant_id, employee_id, entry_type, amount, description, reference_id, posted_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(input.employee_id)
        .bind(input.entry_type.as_str())
        .bind(input.amount)
        .bind(&input.description)
        .bind(input.reference_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert ledger entry: {}", e)))?;
        Some(entry)
    };

    let entry = match entry {
        Some(e) => e,
        // Duplicate commission trigger: the earlier entry stands.
        None => {
            info!(
                employee_id = %input.employee_id,
                entry_type = %input.entry_type,
                reference_id = ?input.reference_id,
                "Commission already posted, skipping"
            );
            return Ok(None);
        }
    };

    sqlx::query(
        "UPDATE employees SET current_balance = current_balance + $1 WHERE tenant_id = $2 AND employee_id = $3",
    )
    .bind(input.amount)
    .bind(input.tenant_id)
    .bind(input.employee_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update balance: {}", e)))?;

    if input.entry_type == LedgerEntryType::Payout {
        sqlx::query(
            "UPDATE employees SET paid_amount = paid_amount + $1 WHERE tenant_id = $2 AND employee_id = $3",
        )
        .bind(input.amount.abs())
        .bind(input.tenant_id)
        .bind(input.employee_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update paid amount: {}", e)))?;
    }

    if input.entry_type.is_commission() {
        COMMISSIONS_POSTED
            .with_label_values(&[input.entry_type.as_str()])
            .inc();
    }

    info!(
        entry_id = %entry.entry_id,
        employee_id = %input.employee_id,
        entry_type = %input.entry_type,
        amount = %input.amount,
        "Ledger entry posted"
    );

    Ok(Some(entry))
}

/// Insert a bank transaction and adjust the cached account balance, inside
/// the caller's transaction. The only write path to
/// `bank_accounts.current_balance`.
pub(crate) async fn post_bank_transaction(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    bank_account_id: Uuid,
    direction: BankDirection,
    amount: Decimal,
    source_type: BankSource,
    reference_id: Option<Uuid>,
    description: Option<&str>,
) -> Result<BankTransaction, AppError> {
    if amount <= Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Bank transaction amount must be positive"
        )));
    }

    let locked: Option<Uuid> = sqlx::query_scalar(
        "SELECT bank_account_id FROM bank_accounts WHERE tenant_id = $1 AND bank_account_id = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(bank_account_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock bank account: {}", e)))?;

    if locked.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Bank account not found")));
    }

    let transaction = sqlx::query_as::<_, BankTransaction>(
        r#"
        INSERT INTO bank_transactions (transaction_id, tenant_id, bank_account_id, direction, amount, source_type, reference_id, description)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING transaction_id, tenant_id, bank_account_id, direction, amount, source_type, reference_id, description, posted_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(bank_account_id)
    .bind(direction.as_str())
    .bind(amount)
    .bind(source_type.as_str())
    .bind(reference_id)
    .bind(description)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to insert bank transaction: {}", e))
    })?;

    sqlx::query(
        "UPDATE bank_accounts SET current_balance = current_balance + $1 WHERE tenant_id = $2 AND bank_account_id = $3",
    )
    .bind(direction.signed(amount))
    .bind(tenant_id)
    .bind(bank_account_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update bank balance: {}", e)))?;

    info!(
        transaction_id = %transaction.transaction_id,
        bank_account_id = %bank_account_id,
        direction = %direction,
        amount = %amount,
        source_type = %source_type,
        "Bank transaction posted"
    );

    Ok(transaction)
}
