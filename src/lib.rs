//! Saldo Payment Orchestrator Library
//!
//! Idempotent multi-provider payment orchestration over a double-entry ledger.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

// Re-export commonly used types
pub use modules::idempotency;
pub use modules::ledger;
pub use modules::payments;
pub use modules::providers;
