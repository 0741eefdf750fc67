pub mod account;
pub mod ledger_entry;
pub mod posting;

pub use account::{Account, AccountKind};
pub use ledger_entry::{EntryDraft, EntryType, LedgerEntry};
pub use posting::{
    compute_balance_updates, plan_entries, validate_balanced, BalanceUpdate, HoldRelease,
};
