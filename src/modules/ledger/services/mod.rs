pub mod ledger_service;
pub mod reconciler;

pub use ledger_service::{BalanceReport, LedgerService};
pub use reconciler::LedgerReconciler;
