pub mod verification;

pub use verification::{BankAccount, VerificationStatus};
