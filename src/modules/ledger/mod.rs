// Ledger module: double-entry accounts, entries, holds, and reconciliation

pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Account, AccountKind, EntryDraft, EntryType, HoldRelease, LedgerEntry};
pub use repositories::{LedgerRepository, Settlement};
pub use services::{BalanceReport, LedgerReconciler, LedgerService};
