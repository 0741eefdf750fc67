// Identity module: read-only seam into the marketplace's KYC verdicts and
// payout bank accounts

pub mod models;
pub mod repositories;

pub use models::{BankAccount, VerificationStatus};
pub use repositories::{InMemoryUserDirectory, MySqlUserDirectory, UserDirectory};
