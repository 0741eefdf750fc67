use crate::core::{AppError, Result};
use crate::modules::payments::models::Transaction;
use crate::modules::payments::repositories::transaction_repository::TransactionRepository;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

/// Thread-safe in-memory transaction store for tests and local development.
/// Clones share the same underlying map.
#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    transactions: Arc<RwLock<HashMap<String, Transaction>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write access for the in-memory ledger store, which mutates the
    /// settling transaction inside its own lock scope.
    pub(crate) async fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Transaction>> {
        self.transactions.write().await
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;

        if transactions.contains_key(&transaction.id) {
            return Err(AppError::duplicate(format!(
                "Transaction {} already recorded",
                transaction.id
            )));
        }

        if let (Some(provider), Some(external_id)) =
            (&transaction.provider, &transaction.external_id)
        {
            let collision = transactions.values().any(|existing| {
                existing.provider.as_deref() == Some(provider.as_str())
                    && existing.external_id.as_deref() == Some(external_id.as_str())
            });
            if collision {
                return Err(AppError::duplicate(format!(
                    "Transaction with external ID {:?} already recorded",
                    transaction.external_id
                )));
            }
        }

        transactions.insert(transaction.id.clone(), transaction.clone());
        Ok(transaction.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(id).cloned())
    }

    async fn find_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|tx| {
                tx.provider.as_deref() == Some(provider)
                    && tx.external_id.as_deref() == Some(external_id)
            })
            .cloned())
    }

    async fn find_refunds_of(&self, parent_transaction_id: &str) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut refunds: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.parent_transaction_id.as_deref() == Some(parent_transaction_id))
            .cloned()
            .collect();
        refunds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(refunds)
    }

    async fn update(&self, transaction: &Transaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;

        if !transactions.contains_key(&transaction.id) {
            return Err(AppError::not_found(format!(
                "Transaction {} not found",
                transaction.id
            )));
        }

        transactions.insert(transaction.id.clone(), transaction.clone());
        Ok(())
    }
}
