use crate::core::{AppError, Result};
use crate::modules::identity::models::{BankAccount, VerificationStatus};
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Read-only seam into the marketplace's user records. The orchestrator
/// consults it only for payout preconditions.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn verification_status(&self, user_id: &str) -> Result<VerificationStatus>;

    async fn bank_account(&self, user_id: &str) -> Result<Option<BankAccount>>;
}

/// Reads the marketplace's `users` and `bank_accounts` tables.
pub struct MySqlUserDirectory {
    pool: MySqlPool,
}

impl MySqlUserDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for MySqlUserDirectory {
    async fn verification_status(&self, user_id: &str) -> Result<VerificationStatus> {
        let status: Option<(VerificationStatus,)> =
            sqlx::query_as("SELECT verification_status FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        status
            .map(|(status,)| status)
            .ok_or_else(|| AppError::not_found(format!("User {} not found", user_id)))
    }

    async fn bank_account(&self, user_id: &str) -> Result<Option<BankAccount>> {
        let account = sqlx::query_as::<_, BankAccount>(
            "SELECT bank_code, account_number, account_holder \
             FROM bank_accounts WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(account)
    }
}
