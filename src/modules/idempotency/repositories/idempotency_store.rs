use crate::core::error::is_unique_violation;
use crate::core::{AppError, Result};
use crate::modules::idempotency::models::{IdempotencyKey, IdempotencyStatus};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::MySqlPool;
use std::time::Duration;

/// Result of claiming a `(provider, event_id)` pair.
#[derive(Debug, Clone, PartialEq)]
pub enum AcquireOutcome {
    /// This caller holds the claim and must process then commit
    Acquired,
    /// Already processed; carries the recorded result for re-acknowledgement
    Duplicate(Option<serde_json::Value>),
    /// Another worker holds a fresh claim; the caller should back off
    InProgress,
}

/// Persistence seam for event claims. The unique `(provider, event_id)` pair
/// is the lock; everything else is classification of the existing row.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claims an event for processing. `reclaim_after` gates how old an
    /// unfinished row must be before it can be claimed again.
    async fn try_acquire(
        &self,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
        reclaim_after: Duration,
        retention: Duration,
    ) -> Result<AcquireOutcome>;

    /// Writes the terminal status. Fails with `Concurrent` when the claim was
    /// reclaimed by another worker before this commit landed.
    async fn commit(
        &self,
        provider: &str,
        event_id: &str,
        status: IdempotencyStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<()>;

    /// Claims a `FAILED` row back to `PROCESSING` immediately, returning the
    /// stored row so the caller can replay its payload.
    async fn requeue(&self, provider: &str, event_id: &str) -> Result<IdempotencyKey>;

    async fn find(&self, provider: &str, event_id: &str) -> Result<Option<IdempotencyKey>>;

    /// `PROCESSING` rows older than the cutoff, oldest first.
    async fn list_abandoned(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IdempotencyKey>>;

    /// Deletes rows past their retention expiry. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

const KEY_COLUMNS: &str = "id, provider, event_id, status, payload, result, attempts, \
     created_at, updated_at, expires_at";

fn reclaim_cutoff(now: DateTime<Utc>, reclaim_after: Duration) -> DateTime<Utc> {
    now - ChronoDuration::seconds(reclaim_after.as_secs() as i64)
}

/// MySQL-backed claim store: INSERT takes the lock, unique-violation
/// classification plus a conditional UPDATE handle every contended path.
pub struct MySqlIdempotencyStore {
    pool: MySqlPool,
}

impl MySqlIdempotencyStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Classifies an existing row after the INSERT lost the race. The
    /// conditional UPDATE is the only reclaim path, so two workers can never
    /// both see `Acquired` for the same stale row.
    async fn classify_existing(
        &self,
        provider: &str,
        event_id: &str,
        reclaim_after: Duration,
    ) -> Result<AcquireOutcome> {
        let existing = match self.find(provider, event_id).await? {
            Some(row) => row,
            // Row purged between INSERT and SELECT; tell the caller to retry
            None => return Ok(AcquireOutcome::InProgress),
        };

        if existing.status == IdempotencyStatus::Processed {
            return Ok(AcquireOutcome::Duplicate(existing.result));
        }

        let now = Utc::now();
        let claimed = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = ?, attempts = attempts + 1, updated_at = ?
            WHERE provider = ? AND event_id = ?
              AND status IN ('processing', 'failed')
              AND updated_at <= ?
            "#,
        )
        .bind(IdempotencyStatus::Processing)
        .bind(now)
        .bind(provider)
        .bind(event_id)
        .bind(reclaim_cutoff(now, reclaim_after))
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 1 {
            return Ok(AcquireOutcome::Acquired);
        }

        // Gate still closed, or another worker won the reclaim. It may even
        // have finished already.
        match self.find(provider, event_id).await? {
            Some(row) if row.status == IdempotencyStatus::Processed => {
                Ok(AcquireOutcome::Duplicate(row.result))
            }
            _ => Ok(AcquireOutcome::InProgress),
        }
    }
}

#[async_trait]
impl IdempotencyStore for MySqlIdempotencyStore {
    async fn try_acquire(
        &self,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
        reclaim_after: Duration,
        retention: Duration,
    ) -> Result<AcquireOutcome> {
        let key = IdempotencyKey::new(provider, event_id, payload.clone(), retention)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (
                id, provider, event_id, status, payload, result,
                attempts, created_at, updated_at, expires_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key.id)
        .bind(&key.provider)
        .bind(&key.event_id)
        .bind(key.status)
        .bind(&key.payload)
        .bind(&key.result)
        .bind(key.attempts)
        .bind(key.created_at)
        .bind(key.updated_at)
        .bind(key.expires_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(AcquireOutcome::Acquired),
            Err(e) if is_unique_violation(&e) => {
                self.classify_existing(provider, event_id, reclaim_after).await
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn commit(
        &self,
        provider: &str,
        event_id: &str,
        status: IdempotencyStatus,
        result: Option<&serde_json::Value>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(AppError::invariant(format!(
                "Commit requires a terminal status, got {}",
                status
            )));
        }

        let updated = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = ?, result = ?, updated_at = ?
            WHERE provider = ? AND event_id = ? AND status = 'processing'
            "#,
        )
        .bind(status)
        .bind(result)
        .bind(Utc::now())
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(AppError::concurrent(format!(
                "Claim on {}/{} was lost before commit",
                provider, event_id
            )));
        }

        Ok(())
    }

    async fn requeue(&self, provider: &str, event_id: &str) -> Result<IdempotencyKey> {
        let claimed = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status = ?, attempts = attempts + 1, updated_at = ?
            WHERE provider = ? AND event_id = ? AND status = 'failed'
            "#,
        )
        .bind(IdempotencyStatus::Processing)
        .bind(Utc::now())
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 0 {
            return match self.find(provider, event_id).await? {
                None => Err(AppError::not_found(format!(
                    "Event {}/{} not found",
                    provider, event_id
                ))),
                Some(row) if row.status == IdempotencyStatus::Processing => Err(
                    AppError::concurrent(format!("Event {}/{} is being processed", provider, event_id)),
                ),
                Some(_) => Err(AppError::validation(
                    "not_requeueable",
                    format!("Event {}/{} is not in a failed state", provider, event_id),
                )),
            };
        }

        self.find(provider, event_id).await?.ok_or_else(|| {
            AppError::internal("Requeued idempotency row vanished before read-back")
        })
    }

    async fn find(&self, provider: &str, event_id: &str) -> Result<Option<IdempotencyKey>> {
        let key = sqlx::query_as::<_, IdempotencyKey>(&format!(
            "SELECT {} FROM idempotency_keys WHERE provider = ? AND event_id = ?",
            KEY_COLUMNS
        ))
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn list_abandoned(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IdempotencyKey>> {
        let keys = sqlx::query_as::<_, IdempotencyKey>(&format!(
            "SELECT {} FROM idempotency_keys \
             WHERE status = 'processing' AND updated_at <= ? \
             ORDER BY updated_at ASC LIMIT ?",
            KEY_COLUMNS
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(deleted.rows_affected())
    }
}
