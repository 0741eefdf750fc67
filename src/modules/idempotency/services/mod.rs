pub mod idempotency_service;
pub mod sweeper;

pub use idempotency_service::IdempotencyService;
pub use sweeper::IdempotencySweeper;
