use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::{
    plan_entries, Account, AccountKind, EntryDraft, HoldRelease, LedgerEntry,
};
use crate::modules::ledger::repositories::{LedgerRepository, Settlement};
use crate::modules::payments::models::Transaction;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Cached-vs-derived balance comparison for one account.
#[derive(Debug, Clone)]
pub struct BalanceReport {
    pub account_id: String,
    pub kind: AccountKind,
    pub cached_balance: Decimal,
    pub derived_balance: Decimal,
}

impl BalanceReport {
    pub fn is_consistent(&self) -> bool {
        self.cached_balance == self.derived_balance
    }
}

/// Ledger engine: the only component that moves account balances. Validates
/// posting sets before any write and hands the storage layer one atomic
/// settlement unit.
pub struct LedgerService {
    ledger: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(ledger: Arc<dyn LedgerRepository>) -> Self {
        Self { ledger }
    }

    /// Finds or opens the user's account for this kind and currency. Racing
    /// creations collapse onto the winning row.
    pub async fn open_account(
        &self,
        user_id: &str,
        kind: AccountKind,
        currency: Currency,
    ) -> Result<Account> {
        if let Some(existing) = self.ledger.find_user_account(user_id, kind, currency).await? {
            return Ok(existing);
        }

        let account = Account::new(user_id.to_string(), kind, currency)?;
        match self.ledger.create_account(&account).await {
            Ok(created) => {
                tracing::info!(
                    account_id = %created.id,
                    user_id = user_id,
                    kind = %kind,
                    currency = %currency,
                    "Opened ledger account"
                );
                Ok(created)
            }
            Err(AppError::Duplicate(_)) => self
                .ledger
                .find_user_account(user_id, kind, currency)
                .await?
                .ok_or_else(|| AppError::internal("Account creation race lost the winning row")),
            Err(e) => Err(e),
        }
    }

    pub async fn account(&self, id: &str) -> Result<Account> {
        self.ledger
            .find_account(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Account {} not found", id)))
    }

    pub async fn entries_for_transaction(&self, transaction_id: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger.entries_for_transaction(transaction_id).await
    }

    /// Settles a transaction: validates the draft set and applies entries,
    /// balance updates, optional hold release, and the terminal status write
    /// as one unit.
    pub async fn settle(
        &self,
        transaction: &Transaction,
        drafts: &[EntryDraft],
        hold_release: Option<HoldRelease>,
    ) -> Result<Transaction> {
        let entries = plan_entries(&transaction.id, drafts)?;
        let mut settlement = Settlement::settled(&transaction.id, entries);
        settlement.hold_release = hold_release;

        let settled = self.ledger.apply_settlement(settlement).await?;
        tracing::info!(
            transaction_id = %settled.id,
            kind = %settled.kind,
            amount = %settled.amount,
            currency = %settled.currency,
            entry_count = drafts.len(),
            "Transaction settled"
        );
        Ok(settled)
    }

    /// Marks a transaction failed with no ledger entries, releasing any hold
    /// the attempt placed.
    pub async fn fail(
        &self,
        transaction: &Transaction,
        error_code: &str,
        error_message: &str,
        hold_release: Option<HoldRelease>,
    ) -> Result<Transaction> {
        let mut settlement = Settlement::failed(&transaction.id, error_code, error_message);
        settlement.hold_release = hold_release;

        let failed = self.ledger.apply_settlement(settlement).await?;
        tracing::warn!(
            transaction_id = %failed.id,
            kind = %failed.kind,
            error_code = error_code,
            "Transaction failed"
        );
        Ok(failed)
    }

    pub async fn cancel(
        &self,
        transaction: &Transaction,
        hold_release: Option<HoldRelease>,
    ) -> Result<Transaction> {
        let mut settlement = Settlement::cancelled(&transaction.id);
        settlement.hold_release = hold_release;

        let cancelled = self.ledger.apply_settlement(settlement).await?;
        tracing::info!(transaction_id = %cancelled.id, "Transaction cancelled");
        Ok(cancelled)
    }

    pub async fn place_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        let account = self.ledger.place_hold(account_id, amount).await?;
        tracing::info!(
            account_id = account_id,
            amount = %amount,
            frozen_balance = %account.frozen_balance,
            "Placed hold"
        );
        Ok(account)
    }

    pub async fn release_hold(&self, account_id: &str, amount: Decimal) -> Result<Account> {
        let account = self.ledger.release_hold(account_id, amount).await?;
        tracing::info!(
            account_id = account_id,
            amount = %amount,
            frozen_balance = %account.frozen_balance,
            "Released hold"
        );
        Ok(account)
    }

    /// Re-derives one account's balance from its full entry history.
    pub async fn verify_account(&self, account: &Account) -> Result<BalanceReport> {
        let (debits, credits) = self.ledger.entry_totals(&account.id).await?;
        let derived_balance = match account.kind {
            AccountKind::Escrow => debits - credits,
            AccountKind::Wallet | AccountKind::Reserve => credits - debits,
        };

        Ok(BalanceReport {
            account_id: account.id.clone(),
            kind: account.kind,
            cached_balance: account.balance,
            derived_balance,
        })
    }

    /// Reconciliation sweep over every active account.
    pub async fn verify_all_accounts(&self) -> Result<Vec<BalanceReport>> {
        let accounts = self.ledger.list_active_accounts().await?;
        let mut reports = Vec::with_capacity(accounts.len());
        for account in &accounts {
            reports.push(self.verify_account(account).await?);
        }
        Ok(reports)
    }
}
