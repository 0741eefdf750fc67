pub mod idempotency_key;

pub use idempotency_key::{IdempotencyKey, IdempotencyStatus};
