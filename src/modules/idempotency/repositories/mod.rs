pub mod idempotency_store;
pub mod in_memory;

pub use idempotency_store::{AcquireOutcome, IdempotencyStore, MySqlIdempotencyStore};
pub use in_memory::InMemoryIdempotencyStore;
