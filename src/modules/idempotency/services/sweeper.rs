use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};

use chrono::{Duration as ChronoDuration, Utc};

use crate::core::AppError;
use crate::modules::idempotency::repositories::IdempotencyStore;

const ABANDONED_LOG_LIMIT: i64 = 100;

/// Background job over the claim store: reports abandoned `PROCESSING` rows
/// (already re-acquirable through the timeout gate) and deletes rows past
/// their retention expiry.
pub struct IdempotencySweeper {
    store: Arc<dyn IdempotencyStore>,
    processing_timeout: Duration,
    sweep_interval: Duration,
}

impl IdempotencySweeper {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        processing_timeout: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            processing_timeout,
            sweep_interval,
        }
    }

    /// Spawned as a tokio task in main.rs.
    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Starting idempotency sweeper"
        );

        let mut ticker = interval(self.sweep_interval);

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok((0, 0)) => {}
                Ok((abandoned, purged)) => {
                    info!(
                        abandoned = abandoned,
                        purged = purged,
                        "Idempotency sweep finished"
                    );
                }
                Err(e) => {
                    error!(error = %e, "Idempotency sweep failed");
                }
            }
        }
    }

    /// One sweep: returns (abandoned rows seen, expired rows purged).
    pub async fn sweep(&self) -> Result<(usize, u64), AppError> {
        let now = Utc::now();
        let cutoff = now - ChronoDuration::seconds(self.processing_timeout.as_secs() as i64);

        let abandoned = self.store.list_abandoned(cutoff, ABANDONED_LOG_LIMIT).await?;
        for row in &abandoned {
            warn!(
                provider = %row.provider,
                event_id = %row.event_id,
                attempts = row.attempts,
                claimed_at = %row.updated_at,
                "Abandoned processing claim, next delivery will reclaim it"
            );
        }

        let purged = self.store.purge_expired(now).await?;

        Ok((abandoned.len(), purged))
    }
}
