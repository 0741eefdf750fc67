// Idempotency module: the (provider, event_id) claim store that makes
// at-least-once webhook delivery exactly-once in effect

pub mod models;
pub mod repositories;
pub mod services;

pub use models::{IdempotencyKey, IdempotencyStatus};
pub use repositories::{AcquireOutcome, IdempotencyStore};
pub use services::{IdempotencyService, IdempotencySweeper};
