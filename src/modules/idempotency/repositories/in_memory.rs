use crate::core::{AppError, Result};
use crate::modules::idempotency::models::{IdempotencyKey, IdempotencyStatus};
use crate::modules::idempotency::repositories::idempotency_store::{
    AcquireOutcome, IdempotencyStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mutex-guarded claim store for tests and local development. Every
/// operation is a read-modify-write, so one lock covers the whole map.
#[derive(Default, Clone)]
pub struct InMemoryIdempotencyStore {
    keys: Arc<Mutex<HashMap<(String, String), IdempotencyKey>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn try_acquire(
        &self,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
        reclaim_after: Duration,
        retention: Duration,
    ) -> Result<AcquireOutcome> {
        let mut keys = self.keys.lock().await;
        let map_key = (provider.to_string(), event_id.to_string());
        let now = Utc::now();

        match keys.get_mut(&map_key) {
            None => {
                let key = IdempotencyKey::new(provider, event_id, payload.clone(), retention)?;
                keys.insert(map_key, key);
                Ok(AcquireOutcome::Acquired)
            }
            Some(row) if row.status == IdempotencyStatus::Processed => {
                Ok(AcquireOutcome::Duplicate(row.result.clone()))
            }
            Some(row) if row.is_reclaimable(reclaim_after, now) => {
                row.status = IdempotencyStatus::Processing;
                row.attempts += 1;
                row.updated_at = now;
                Ok(AcquireOutcome::Acquired)
            }
            Some(_) => Ok(AcquireOutcome::InProgress),
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

        let mut keys = self.keys.lock().await;
        let row = keys
            .get_mut(&(provider.to_string(), event_id.to_string()))
            .filter(|row| row.status == IdempotencyStatus::Processing)
            .ok_or_else(|| {
                AppError::concurrent(format!(
                    "Claim on {}/{} was lost before commit",
                    provider, event_id
                ))
            })?;

        row.status = status;
        row.result = result.cloned();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn requeue(&self, provider: &str, event_id: &str) -> Result<IdempotencyKey> {
        let mut keys = self.keys.lock().await;
        let row = keys
            .get_mut(&(provider.to_string(), event_id.to_string()))
            .ok_or_else(|| {
                AppError::not_found(format!("Event {}/{} not found", provider, event_id))
            })?;

        match row.status {
            IdempotencyStatus::Processing => Err(AppError::concurrent(format!(
                "Event {}/{} is being processed",
                provider, event_id
            ))),
            IdempotencyStatus::Processed => Err(AppError::validation(
                "not_requeueable",
                format!("Event {}/{} is not in a failed state", provider, event_id),
            )),
            IdempotencyStatus::Failed => {
                row.status = IdempotencyStatus::Processing;
                row.attempts += 1;
                row.updated_at = Utc::now();
                Ok(row.clone())
            }
        }
    }

    async fn find(&self, provider: &str, event_id: &str) -> Result<Option<IdempotencyKey>> {
        let keys = self.keys.lock().await;
        Ok(keys
            .get(&(provider.to_string(), event_id.to_string()))
            .cloned())
    }

    async fn list_abandoned(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IdempotencyKey>> {
        let keys = self.keys.lock().await;
        let mut abandoned: Vec<IdempotencyKey> = keys
            .values()
            .filter(|row| row.status == IdempotencyStatus::Processing && row.updated_at <= cutoff)
            .cloned()
            .collect();
        abandoned.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        abandoned.truncate(limit as usize);
        Ok(abandoned)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut keys = self.keys.lock().await;
        let before = keys.len();
        keys.retain(|_, row| !row.is_expired(now));
        Ok((before - keys.len()) as u64)
    }
}
