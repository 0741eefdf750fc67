use crate::core::{AppError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Side of a double-entry posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(6)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Debit,
    Credit,
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryType::Debit => write!(f, "debit"),
            EntryType::Credit => write!(f, "credit"),
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryType::Debit),
            "credit" => Ok(EntryType::Credit),
            _ => Err(format!("Invalid entry type: {}", s)),
        }
    }
}

/// One row of a balanced posting set. Entries are append-only: they are
/// written as a set together with their transaction's settlement and are
/// never updated or deleted afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    /// Unique entry ID (UUID)
    pub id: String,

    /// Transaction this entry settles
    pub transaction_id: String,

    /// Account the entry posts against
    pub account_id: String,

    /// Debit or credit
    pub entry_type: EntryType,

    /// Posted amount, always positive; direction comes from entry_type
    pub amount: Decimal,

    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        transaction_id: String,
        account_id: String,
        entry_type: EntryType,
        amount: Decimal,
    ) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::invariant(format!(
                "Ledger entry amount must be positive, got {}",
                amount
            )));
        }

        if transaction_id.trim().is_empty() || account_id.trim().is_empty() {
            return Err(AppError::invariant(
                "Ledger entry requires a transaction ID and an account ID",
            ));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            account_id,
            entry_type,
            amount,
            created_at: Utc::now(),
        })
    }
}

/// Planned posting against an account, before the settling transaction is
/// known. The ledger service turns a balanced set of drafts into entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub account_id: String,
    pub entry_type: EntryType,
    pub amount: Decimal,
}

impl EntryDraft {
    pub fn debit(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            entry_type: EntryType::Debit,
            amount,
        }
    }

    pub fn credit(account_id: impl Into<String>, amount: Decimal) -> Self {
        Self {
            account_id: account_id.into(),
            entry_type: EntryType::Credit,
            amount,
        }
    }
}
