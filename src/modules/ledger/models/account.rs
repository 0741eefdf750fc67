use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::ledger_entry::EntryType;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account kind. The kind fixes the balance polarity: ESCROW tracks funds the
/// platform holds at providers and grows on DEBIT; WALLET and RESERVE track
/// funds owed to their owner and grow on CREDIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// User-facing balance (clients and workers)
    Wallet,
    /// Funds held at providers on the platform's behalf
    Escrow,
    /// Platform revenue (commission legs land here)
    Reserve,
}

impl AccountKind {
    /// Signed balance movement caused by one ledger entry against an account
    /// of this kind.
    pub fn balance_delta(&self, entry_type: EntryType, amount: Decimal) -> Decimal {
        match (self, entry_type) {
            (AccountKind::Escrow, EntryType::Debit) => amount,
            (AccountKind::Escrow, EntryType::Credit) => -amount,
            (_, EntryType::Credit) => amount,
            (_, EntryType::Debit) => -amount,
        }
    }
}

impl std::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountKind::Wallet => write!(f, "wallet"),
            AccountKind::Escrow => write!(f, "escrow"),
            AccountKind::Reserve => write!(f, "reserve"),
        }
    }
}

impl std::str::FromStr for AccountKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "wallet" => Ok(AccountKind::Wallet),
            "escrow" => Ok(AccountKind::Escrow),
            "reserve" => Ok(AccountKind::Reserve),
            _ => Err(format!("Invalid account kind: {}", s)),
        }
    }
}

/// Internal money container. Balances are mutated only by the ledger engine's
/// atomic apply; accounts are deactivated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    /// Unique account ID (UUID)
    pub id: String,

    /// Owning user (the platform system user for escrow/reserve)
    pub user_id: String,

    /// Account kind, fixes balance polarity
    pub kind: AccountKind,

    /// Account currency; every entry against this account must match
    pub currency: Currency,

    /// Cached balance, derived from the entry history
    pub balance: Decimal,

    /// Portion of the balance held for in-flight payouts
    pub frozen_balance: Decimal,

    /// Soft-deactivation flag
    pub active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: String, kind: AccountKind, currency: Currency) -> Result<Self> {
        if user_id.trim().is_empty() {
            return Err(AppError::validation(
                "invalid_account",
                "Account user ID cannot be empty",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            kind,
            currency,
            balance: Decimal::ZERO,
            frozen_balance: Decimal::ZERO,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Balance not committed to in-flight payouts.
    pub fn available_balance(&self) -> Decimal {
        self.balance - self.frozen_balance
    }

    pub fn has_available(&self, amount: Decimal) -> bool {
        self.available_balance() >= amount
    }
}
