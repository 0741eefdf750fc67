use crate::core::{AppError, Result};
use crate::modules::identity::models::{BankAccount, VerificationStatus};
use crate::modules::identity::repositories::user_directory::UserDirectory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
struct UserRecord {
    status: VerificationStatus,
    bank_account: Option<BankAccount>,
}

/// In-memory user directory for tests and local development.
#[derive(Default, Clone)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<String, UserRecord>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(
        &self,
        user_id: &str,
        status: VerificationStatus,
        bank_account: Option<BankAccount>,
    ) {
        let mut users = self.users.write().await;
        users.insert(
            user_id.to_string(),
            UserRecord {
                status,
                bank_account,
            },
        );
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn verification_status(&self, user_id: &str) -> Result<VerificationStatus> {
        let users = self.users.read().await;
        users
            .get(user_id)
            .map(|record| record.status)
            .ok_or_else(|| AppError::not_found(format!("User {} not found", user_id)))
    }

    async fn bank_account(&self, user_id: &str) -> Result<Option<BankAccount>> {
        let users = self.users.read().await;
        Ok(users
            .get(user_id)
            .and_then(|record| record.bank_account.clone()))
    }
}
