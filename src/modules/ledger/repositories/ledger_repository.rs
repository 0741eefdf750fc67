use crate::core::error::is_unique_violation;
use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::{
    compute_balance_updates, Account, AccountKind, HoldRelease, LedgerEntry,
};
use crate::modules::payments::models::{Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::collections::HashMap;

/// Atomic settlement unit: the transaction's terminal status write, the
/// balanced entry set, the balance updates they imply, and an optional hold
/// release commit together or not at all.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction_id: String,
    pub new_status: TransactionStatus,
    pub entries: Vec<LedgerEntry>,
    pub hold_release: Option<HoldRelease>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl Settlement {
    pub fn settled(transaction_id: impl Into<String>, entries: Vec<LedgerEntry>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            new_status: TransactionStatus::Settled,
            entries,
            hold_release: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failed(
        transaction_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            new_status: TransactionStatus::Failed,
            entries: Vec::new(),
            hold_release: None,
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
        }
    }

    pub fn cancelled(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            new_status: TransactionStatus::Cancelled,
            entries: Vec::new(),
            hold_release: None,
            error_code: None,
            error_message: None,
        }
    }

    pub fn with_hold_release(mut self, account_id: impl Into<String>, amount: Decimal) -> Self {
        self.hold_release = Some(HoldRelease {
            account_id: account_id.into(),
            amount,
        });
        self
    }
}

/// Persistence seam for accounts, entries, and the atomic settlement apply.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn create_account(&self, account: &Account) -> Result<Account>;

    async fn find_account(&self, id: &str) -> Result<Option<Account>>;

    async fn find_user_account(
        &self,
        user_id: &str,
        kind: AccountKind,
        currency: Currency,
    ) -> Result<Option<Account>>;

    async fn list_active_accounts(&self) -> Result<Vec<Account>>;

    async fn deactivate_account(&self, id: &str) -> Result<()>;

    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>>;

    async fn entries_for_account(&self, account_id: &str) -> Result<Vec<LedgerEntry>>;

    /// Total debits and credits ever posted against an account.
    async fn entry_totals(&self, account_id: &str) -> Result<(Decimal, Decimal)>;

    /// Freezes part of an account's balance for an in-flight payout.
    async fn place_hold(&self, account_id: &str, amount: Decimal) -> Result<Account>;

    /// Releases a hold without posting entries (failed payout).
    async fn release_hold(&self, account_id: &str, amount: Decimal) -> Result<Account>;

    /// Applies a settlement atomically. Fails with no partial write when the
    /// transition is invalid, an account is missing or mismatched, or a
    /// balance would go negative.
    async fn apply_settlement(&self, settlement: Settlement) -> Result<Transaction>;
}

const ACCOUNT_COLUMNS: &str =
    "id, user_id, kind, currency, balance, frozen_balance, active, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, transaction_id, account_id, entry_type, amount, created_at";

const TRANSACTION_COLUMNS: &str = "id, kind, status, amount, currency, source_account_id, \
     destination_account_id, external_id, provider, payment_method, parent_transaction_id, \
     booking_id, error_code, error_message, metadata, created_at, updated_at, settled_at";

/// MySQL-backed ledger store. Settlements run in a single database
/// transaction with row locks taken in sorted account order.
pub struct MySqlLedgerRepository {
    pool: MySqlPool,
}

impl MySqlLedgerRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for MySqlLedgerRepository {
    async fn create_account(&self, account: &Account) -> Result<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, kind, currency, balance, frozen_balance,
                active, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.kind)
        .bind(account.currency)
        .bind(account.balance)
        .bind(account.frozen_balance)
        .bind(account.active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::duplicate(format!(
                    "Account already exists for user {} ({} {})",
                    account.user_id, account.kind, account.currency
                ))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(account.clone())
    }

    async fn find_account(&self, id: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn find_user_account(
        &self,
        user_id: &str,
        kind: AccountKind,
        currency: Currency,
    ) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? AND kind = ? AND currency = ?",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .bind(kind)
        .bind(currency)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE active = TRUE ORDER BY created_at",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(accounts)
    }

    async fn deactivate_account(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET active = FALSE, updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Account {} not found", id)));
        }

        Ok(())
    }

    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE transaction_id = ? ORDER BY created_at",
            ENTRY_COLUMNS
        ))
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn entries_for_account(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE account_id = ? ORDER BY created_at",
            ENTRY_COLUMNS
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn entry_totals(&self, account_id: &str) -> Result<(Decimal, Decimal)> {
        let row: (Option<Decimal>, Option<Decimal>) = sqlx::query_as(
            r#"
            SELECT
                SUM(CASE WHEN entry_type = 'debit' THEN amount END) AS debits,
                SUM(CASE WHEN entry_type = 'credit' THEN amount END) AS credits
            FROM ledger_entries
            WHERE account_id = ?
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.0.unwrap_or_default(), row.1.unwrap_or_default()))
    }

    async fn place_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_amount",
                "Hold amount must be positive",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let mut account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = ? FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Account {} not found", account_id)))?;

        if !account.active {
            return Err(AppError::validation(
                "account_inactive",
                format!("Account {} is deactivated", account_id),
            ));
        }

        if !account.has_available(amount) {
            return Err(AppError::validation(
                "insufficient_funds",
                format!(
                    "Account {} has {} available, cannot hold {}",
                    account_id,
                    account.available_balance(),
                    amount
                ),
            ));
        }

        account.frozen_balance += amount;
        account.updated_at = Utc::now();

        sqlx::query("UPDATE accounts SET frozen_balance = ?, updated_at = ? WHERE id = ?")
            .bind(account.frozen_balance)
            .bind(account.updated_at)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn release_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_amount",
                "Hold release amount must be positive",
            ));
        }

        let mut tx = self.pool.begin().await?;

        let mut account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE id = ? FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(account_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Account {} not found", account_id)))?;

        if account.frozen_balance < amount {
            return Err(AppError::invariant(format!(
                "Hold release of {} exceeds frozen balance {} on account {}",
                amount, account.frozen_balance, account_id
            )));
        }

        account.frozen_balance -= amount;
        account.updated_at = Utc::now();

        sqlx::query("UPDATE accounts SET frozen_balance = ?, updated_at = ? WHERE id = ?")
            .bind(account.frozen_balance)
            .bind(account.updated_at)
            .bind(account_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(account)
    }

    async fn apply_settlement(&self, settlement: Settlement) -> Result<Transaction> {
        for entry in &settlement.entries {
            if entry.transaction_id != settlement.transaction_id {
                return Err(AppError::invariant(format!(
                    "Entry {} belongs to transaction {}, not {}",
                    entry.id, entry.transaction_id, settlement.transaction_id
                )));
            }
        }

        let mut tx = self.pool.begin().await?;

        let mut transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE id = ? FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(&settlement.transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::not_found(format!(
                "Transaction {} not found",
                settlement.transaction_id
            ))
        })?;

        transaction.transition(settlement.new_status)?;
        if let Some(code) = &settlement.error_code {
            transaction.error_code = Some(code.clone());
        }
        if let Some(message) = &settlement.error_message {
            transaction.error_message = Some(message.clone());
        }

        // Lock touched accounts in sorted order so concurrent settlements
        // cannot deadlock on each other.
        let mut account_ids: Vec<&str> = settlement
            .entries
            .iter()
            .map(|entry| entry.account_id.as_str())
            .chain(
                settlement
                    .hold_release
                    .as_ref()
                    .map(|release| release.account_id.as_str()),
            )
            .collect();
        account_ids.sort_unstable();
        account_ids.dedup();

        let mut accounts = HashMap::new();
        for account_id in &account_ids {
            let account = sqlx::query_as::<_, Account>(&format!(
                "SELECT {} FROM accounts WHERE id = ? FOR UPDATE",
                ACCOUNT_COLUMNS
            ))
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::invariant(format!("Posting references unknown account {}", account_id))
            })?;
            accounts.insert(account.id.clone(), account);
        }

        let updates = compute_balance_updates(
            &accounts,
            &settlement.entries,
            settlement.hold_release.as_ref(),
            transaction.currency,
        )?;

        for update in &updates {
            sqlx::query("UPDATE accounts SET balance = ?, frozen_balance = ?, updated_at = ? WHERE id = ?")
                .bind(update.balance)
                .bind(update.frozen_balance)
                .bind(Utc::now())
                .bind(&update.account_id)
                .execute(&mut *tx)
                .await?;
        }

        for entry in &settlement.entries {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (
                    id, transaction_id, account_id, entry_type, amount, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.transaction_id)
            .bind(&entry.account_id)
            .bind(entry.entry_type)
            .bind(entry.amount)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, error_code = ?, error_message = ?, settled_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(transaction.status)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(transaction.settled_at)
        .bind(transaction.updated_at)
        .bind(&transaction.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(transaction)
    }
}
