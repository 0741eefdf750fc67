use crate::core::Result;
use crate::modules::idempotency::models::{IdempotencyKey, IdempotencyStatus};
use crate::modules::idempotency::repositories::{AcquireOutcome, IdempotencyStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Two-phase claim protocol over the store: `try_acquire` before processing,
/// exactly one `commit_*` after.
pub struct IdempotencyService {
    store: Arc<dyn IdempotencyStore>,
    processing_timeout: Duration,
    retention: Duration,
}

impl IdempotencyService {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        processing_timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            processing_timeout,
            retention,
        }
    }

    pub async fn try_acquire(
        &self,
        provider: &str,
        event_id: &str,
        payload: &serde_json::Value,
    ) -> Result<AcquireOutcome> {
        let outcome = self
            .store
            .try_acquire(
                provider,
                event_id,
                payload,
                self.processing_timeout,
                self.retention,
            )
            .await?;

        match &outcome {
            AcquireOutcome::Acquired => {
                tracing::debug!(provider = provider, event_id = event_id, "Claimed event")
            }
            AcquireOutcome::Duplicate(_) => {
                tracing::info!(
                    provider = provider,
                    event_id = event_id,
                    "Duplicate event acknowledged without reprocessing"
                )
            }
            AcquireOutcome::InProgress => {
                tracing::warn!(
                    provider = provider,
                    event_id = event_id,
                    "Event already in flight, telling the provider to retry"
                )
            }
        }

        Ok(outcome)
    }

    pub async fn commit_processed(
        &self,
        provider: &str,
        event_id: &str,
        result: serde_json::Value,
    ) -> Result<()> {
        self.store
            .commit(provider, event_id, IdempotencyStatus::Processed, Some(&result))
            .await
    }

    pub async fn commit_failed(
        &self,
        provider: &str,
        event_id: &str,
        error_code: &str,
        error_message: &str,
    ) -> Result<()> {
        let result = json!({
            "error_code": error_code,
            "error_message": error_message,
        });
        self.store
            .commit(provider, event_id, IdempotencyStatus::Failed, Some(&result))
            .await
    }

    /// Reopens a failed event for the caller to replay. Returns the stored
    /// row, payload included.
    pub async fn requeue(&self, provider: &str, event_id: &str) -> Result<IdempotencyKey> {
        let key = self.store.requeue(provider, event_id).await?;
        tracing::info!(
            provider = provider,
            event_id = event_id,
            attempts = key.attempts,
            "Requeued failed event"
        );
        Ok(key)
    }
}
