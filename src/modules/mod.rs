pub mod health;
pub mod idempotency;
pub mod identity;
pub mod ledger;
pub mod payments;
pub mod providers;
