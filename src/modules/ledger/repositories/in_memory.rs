use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::{
    compute_balance_updates, Account, AccountKind, LedgerEntry,
};
use crate::modules::ledger::repositories::ledger_repository::{LedgerRepository, Settlement};
use crate::modules::payments::models::Transaction;
use crate::modules::payments::repositories::InMemoryTransactionRepository;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Thread-safe in-memory ledger store for tests and local development. It
/// shares the transaction map with an [`InMemoryTransactionRepository`] so a
/// settlement mutates entries, balances, and the transaction row under one
/// lock scope, mirroring the MySQL store's single database transaction.
#[derive(Clone)]
pub struct InMemoryLedgerRepository {
    accounts: Arc<RwLock<HashMap<String, Account>>>,
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
    transactions: InMemoryTransactionRepository,
}

impl InMemoryLedgerRepository {
    pub fn new(transactions: InMemoryTransactionRepository) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            entries: Arc::new(RwLock::new(Vec::new())),
            transactions,
        }
    }

    /// The transaction store this ledger settles against.
    pub fn transactions(&self) -> &InMemoryTransactionRepository {
        &self.transactions
    }

    /// Corrupts a cached balance behind the ledger's back.
    #[cfg(test)]
    pub(crate) async fn overwrite_balance_for_test(&self, account_id: &str, balance: Decimal) {
        let mut accounts = self.accounts.write().await;
        if let Some(account) = accounts.get_mut(account_id) {
            account.balance = balance;
        }
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn create_account(&self, account: &Account) -> Result<Account> {
        let mut accounts = self.accounts.write().await;

        let collision = accounts.values().any(|existing| {
            existing.user_id == account.user_id
                && existing.kind == account.kind
                && existing.currency == account.currency
        });
        if collision {
            return Err(AppError::duplicate(format!(
                "Account already exists for user {} ({} {})",
                account.user_id, account.kind, account.currency
            )));
        }

        accounts.insert(account.id.clone(), account.clone());
        Ok(account.clone())
    }

    async fn find_account(&self, id: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(id).cloned())
    }

    async fn find_user_account(
        &self,
        user_id: &str,
        kind: AccountKind,
        currency: Currency,
    ) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|account| {
                account.user_id == user_id
                    && account.kind == kind
                    && account.currency == currency
            })
            .cloned())
    }

    async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().await;
        let mut active: Vec<Account> = accounts
            .values()
            .filter(|account| account.active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn deactivate_account(&self, id: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("Account {} not found", id)))?;
        account.active = false;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn entries_for_account(&self, account_id: &str) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn entry_totals(&self, account_id: &str) -> Result<(Decimal, Decimal)> {
        use crate::modules::ledger::models::EntryType;

        let entries = self.entries.read().await;
        let mut debits = Decimal::ZERO;
        let mut credits = Decimal::ZERO;
        for entry in entries.iter().filter(|e| e.account_id == account_id) {
            match entry.entry_type {
                EntryType::Debit => debits += entry.amount,
                EntryType::Credit => credits += entry.amount,
            }
        }
        Ok((debits, credits))
    }

    async fn place_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_amount",
                "Hold amount must be positive",
            ));
        }

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
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
        Ok(account.clone())
    }

    async fn release_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_amount",
                "Hold release amount must be positive",
            ));
        }

        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| AppError::not_found(format!("Account {} not found", account_id)))?;

        if account.frozen_balance < amount {
            return Err(AppError::invariant(format!(
                "Hold release of {} exceeds frozen balance {} on account {}",
                amount, account.frozen_balance, account_id
            )));
        }

        account.frozen_balance -= amount;
        account.updated_at = Utc::now();
        Ok(account.clone())
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

        // Lock order: transactions, then ledger cells. Everything below
        // mutates only after all checks pass.
        let mut transactions = self.transactions.write().await;
        let mut accounts = self.accounts.write().await;
        let mut entries_store = self.entries.write().await;

        let mut transaction = transactions
            .get(&settlement.transaction_id)
            .cloned()
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

        let mut touched = HashMap::new();
        for entry in &settlement.entries {
            if let Some(account) = accounts.get(&entry.account_id) {
                touched.insert(account.id.clone(), account.clone());
            }
        }
        if let Some(release) = &settlement.hold_release {
            if let Some(account) = accounts.get(&release.account_id) {
                touched.insert(account.id.clone(), account.clone());
            }
        }

        let updates = compute_balance_updates(
            &touched,
            &settlement.entries,
            settlement.hold_release.as_ref(),
            transaction.currency,
        )?;

        for update in updates {
            let account = accounts
                .get_mut(&update.account_id)
                .ok_or_else(|| AppError::internal("settled account vanished"))?;
            account.balance = update.balance;
            account.frozen_balance = update.frozen_balance;
            account.updated_at = Utc::now();
        }

        entries_store.extend(settlement.entries.iter().cloned());
        transactions.insert(transaction.id.clone(), transaction.clone());

        Ok(transaction)
    }
}
