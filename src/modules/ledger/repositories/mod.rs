pub mod in_memory;
pub mod ledger_repository;

pub use in_memory::InMemoryLedgerRepository;
pub use ledger_repository::{LedgerRepository, MySqlLedgerRepository, Settlement};
