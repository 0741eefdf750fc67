// Payments module: transaction records, provider orchestration, and the
// webhook ingress that turns deliveries into settled ledger state

pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{Transaction, TransactionKind, TransactionStatus};
pub use repositories::TransactionRepository;
pub use services::{PaymentOrchestrator, WebhookProcessor};
