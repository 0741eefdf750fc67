use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::account::Account;
use crate::modules::ledger::models::ledger_entry::{EntryDraft, EntryType, LedgerEntry};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// New cached balances for one account after a posting set is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceUpdate {
    pub account_id: String,
    pub balance: Decimal,
    pub frozen_balance: Decimal,
}

/// Hold released together with a settlement (payout leaving its wallet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRelease {
    pub account_id: String,
    pub amount: Decimal,
}

/// Checks the double-entry invariant over a draft set: non-empty, every
/// amount positive, and debits equal to credits.
pub fn validate_balanced(drafts: &[EntryDraft]) -> Result<()> {
    if drafts.is_empty() {
        return Err(AppError::invariant("Posting set cannot be empty"));
    }

    let mut debits = Decimal::ZERO;
    let mut credits = Decimal::ZERO;

    for draft in drafts {
        if draft.amount <= Decimal::ZERO {
            return Err(AppError::invariant(format!(
                "Posting amount must be positive, got {} for account {}",
                draft.amount, draft.account_id
            )));
        }

        match draft.entry_type {
            EntryType::Debit => debits += draft.amount,
            EntryType::Credit => credits += draft.amount,
        }
    }

    if debits != credits {
        return Err(AppError::invariant(format!(
            "Unbalanced posting set: debits {} != credits {}",
            debits, credits
        )));
    }

    Ok(())
}

/// Materializes a balanced draft set into entries for a transaction.
pub fn plan_entries(transaction_id: &str, drafts: &[EntryDraft]) -> Result<Vec<LedgerEntry>> {
    validate_balanced(drafts)?;

    drafts
        .iter()
        .map(|draft| {
            LedgerEntry::new(
                transaction_id.to_string(),
                draft.account_id.clone(),
                draft.entry_type,
                draft.amount,
            )
        })
        .collect()
}

/// Computes the post-apply balances for every account touched by an entry
/// set, honoring account-kind polarity. Fails without side effects when an
/// entry references a missing, inactive, or wrong-currency account, when a
/// balance would go negative, or when a released hold exceeds the frozen
/// balance.
pub fn compute_balance_updates(
    accounts: &HashMap<String, Account>,
    entries: &[LedgerEntry],
    hold_release: Option<&HoldRelease>,
    currency: Currency,
) -> Result<Vec<BalanceUpdate>> {
    let mut working: HashMap<String, BalanceUpdate> = HashMap::new();

    let mut lookup = |working: &mut HashMap<String, BalanceUpdate>,
                      account_id: &str|
     -> Result<()> {
        if working.contains_key(account_id) {
            return Ok(());
        }
        let account = accounts.get(account_id).ok_or_else(|| {
            AppError::invariant(format!("Posting references unknown account {}", account_id))
        })?;
        if !account.active {
            return Err(AppError::invariant(format!(
                "Posting references deactivated account {}",
                account_id
            )));
        }
        working.insert(
            account_id.to_string(),
            BalanceUpdate {
                account_id: account_id.to_string(),
                balance: account.balance,
                frozen_balance: account.frozen_balance,
            },
        );
        Ok(())
    };

    if let Some(release) = hold_release {
        lookup(&mut working, &release.account_id)?;
        let update = working
            .get_mut(&release.account_id)
            .ok_or_else(|| AppError::internal("hold release account vanished"))?;
        update.frozen_balance -= release.amount;
        if update.frozen_balance < Decimal::ZERO {
            return Err(AppError::invariant(format!(
                "Hold release of {} exceeds frozen balance on account {}",
                release.amount, release.account_id
            )));
        }
    }

    for entry in entries {
        lookup(&mut working, &entry.account_id)?;
        let account = accounts
            .get(&entry.account_id)
            .ok_or_else(|| AppError::internal("entry account vanished"))?;
        if account.currency != currency {
            return Err(AppError::invariant(format!(
                "Account {} holds {} but the posting is in {}",
                entry.account_id, account.currency, currency
            )));
        }
        let kind = account.kind;
        let update = working
            .get_mut(&entry.account_id)
            .ok_or_else(|| AppError::internal("entry account vanished"))?;
        update.balance += kind.balance_delta(entry.entry_type, entry.amount);
    }

    for update in working.values() {
        if update.balance < Decimal::ZERO {
            return Err(AppError::invariant(format!(
                "Posting would drive account {} negative ({})",
                update.account_id, update.balance
            )));
        }
        if update.frozen_balance > update.balance {
            return Err(AppError::invariant(format!(
                "Frozen balance {} would exceed balance {} on account {}",
                update.frozen_balance, update.balance, update.account_id
            )));
        }
    }

    Ok(working.into_values().collect())
}
