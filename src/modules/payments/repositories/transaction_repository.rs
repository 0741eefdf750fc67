use crate::core::error::is_unique_violation;
use crate::core::{AppError, Result};
use crate::modules::payments::models::Transaction;
use async_trait::async_trait;
use sqlx::MySqlPool;

/// Persistence seam for transaction rows. Terminal status writes do not
/// happen here: they are part of the ledger settlement's atomic unit.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Inserts a new transaction. A `(provider, external_id)` collision maps
    /// to `AppError::Duplicate`.
    async fn create(&self, transaction: &Transaction) -> Result<Transaction>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Transaction>>;

    /// Looks a transaction up by the provider's payment/disbursement ID, the
    /// key webhooks carry.
    async fn find_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>>;

    async fn find_refunds_of(&self, parent_transaction_id: &str) -> Result<Vec<Transaction>>;

    /// Writes back pre-settlement mutations (external ID backfill,
    /// PENDING -> PROCESSING moves).
    async fn update(&self, transaction: &Transaction) -> Result<()>;
}

const TRANSACTION_COLUMNS: &str = "id, kind, status, amount, currency, source_account_id, \
     destination_account_id, external_id, provider, payment_method, parent_transaction_id, \
     booking_id, error_code, error_message, metadata, created_at, updated_at, settled_at";

/// MySQL-backed transaction store
pub struct MySqlTransactionRepository {
    pool: MySqlPool,
}

impl MySqlTransactionRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for MySqlTransactionRepository {
    async fn create(&self, transaction: &Transaction) -> Result<Transaction> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, kind, status, amount, currency, source_account_id,
                destination_account_id, external_id, provider, payment_method,
                parent_transaction_id, booking_id, error_code, error_message,
                metadata, created_at, updated_at, settled_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&transaction.id)
        .bind(transaction.kind)
        .bind(transaction.status)
        .bind(transaction.amount)
        .bind(transaction.currency)
        .bind(&transaction.source_account_id)
        .bind(&transaction.destination_account_id)
        .bind(&transaction.external_id)
        .bind(&transaction.provider)
        .bind(&transaction.payment_method)
        .bind(&transaction.parent_transaction_id)
        .bind(&transaction.booking_id)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(&transaction.metadata)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .bind(transaction.settled_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::duplicate(format!(
                    "Transaction with external ID {:?} already recorded",
                    transaction.external_id
                ))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(transaction.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn find_by_external_id(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE provider = ? AND external_id = ?",
            TRANSACTION_COLUMNS
        ))
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(transaction)
    }

    async fn find_refunds_of(&self, parent_transaction_id: &str) -> Result<Vec<Transaction>> {
        let refunds = sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {} FROM transactions WHERE parent_transaction_id = ? ORDER BY created_at",
            TRANSACTION_COLUMNS
        ))
        .bind(parent_transaction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(refunds)
    }

    async fn update(&self, transaction: &Transaction) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?, external_id = ?, provider = ?, payment_method = ?,
                source_account_id = ?, destination_account_id = ?, error_code = ?,
                error_message = ?, metadata = ?, updated_at = ?, settled_at = ?
            WHERE id = ?
            "#,
        )
        .bind(transaction.status)
        .bind(&transaction.external_id)
        .bind(&transaction.provider)
        .bind(&transaction.payment_method)
        .bind(&transaction.source_account_id)
        .bind(&transaction.destination_account_id)
        .bind(&transaction.error_code)
        .bind(&transaction.error_message)
        .bind(&transaction.metadata)
        .bind(transaction.updated_at)
        .bind(transaction.settled_at)
        .bind(&transaction.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::duplicate(format!(
                    "Transaction with external ID {:?} already recorded",
                    transaction.external_id
                ))
            } else {
                AppError::Database(e)
            }
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Transaction {} not found",
                transaction.id
            )));
        }

        Ok(())
    }
}
