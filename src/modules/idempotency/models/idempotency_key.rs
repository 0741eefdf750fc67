use crate::core::{AppError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

/// Processing state of a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(10)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    /// A worker holds the claim and is processing the event
    Processing,
    /// Terminal: the event was applied; duplicates re-acknowledge
    Processed,
    /// Terminal but retryable after the reclaim gate opens
    Failed,
}

impl IdempotencyStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IdempotencyStatus::Processed | IdempotencyStatus::Failed)
    }
}

impl std::fmt::Display for IdempotencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdempotencyStatus::Processing => write!(f, "processing"),
            IdempotencyStatus::Processed => write!(f, "processed"),
            IdempotencyStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for IdempotencyStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(IdempotencyStatus::Processing),
            "processed" => Ok(IdempotencyStatus::Processed),
            "failed" => Ok(IdempotencyStatus::Failed),
            _ => Err(format!("Invalid idempotency status: {}", s)),
        }
    }
}

/// One `(provider, event_id)` claim. Inserting the row IS the lock: the
/// unique pair turns concurrent deliveries of the same event into exactly one
/// worker that processes and N-1 that are told to back off or re-acknowledge.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdempotencyKey {
    /// Unique key ID (UUID)
    pub id: String,
    /// Provider that delivered the event (nusapay, qrispay, kirimpay)
    pub provider: String,
    /// Provider-assigned event identifier, unique per provider
    pub event_id: String,
    pub status: IdempotencyStatus,
    /// Raw event payload as received, kept for replay and audit
    pub payload: serde_json::Value,
    /// Processing result recorded on commit; returned to duplicates
    pub result: Option<serde_json::Value>,
    /// Number of processing claims taken on this event
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    /// Last state change; the reclaim gate measures age from here
    pub updated_at: DateTime<Utc>,
    /// First-seen time plus the retention window; the sweeper deletes past this
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyKey {
    pub fn new(
        provider: &str,
        event_id: &str,
        payload: serde_json::Value,
        retention: Duration,
    ) -> Result<Self> {
        if provider.trim().is_empty() {
            return Err(AppError::validation(
                "invalid_provider",
                "Provider cannot be empty",
            ));
        }
        if event_id.trim().is_empty() {
            return Err(AppError::validation(
                "invalid_event_id",
                "Event ID cannot be empty",
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.to_string(),
            event_id: event_id.to_string(),
            status: IdempotencyStatus::Processing,
            payload,
            result: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
            expires_at: now + ChronoDuration::days(retention.as_secs() as i64 / 86_400),
        })
    }

    /// A non-`PROCESSED` row whose last state change is older than the
    /// processing timeout may be claimed again.
    pub fn is_reclaimable(&self, processing_timeout: Duration, now: DateTime<Utc>) -> bool {
        if self.status == IdempotencyStatus::Processed {
            return false;
        }
        let gate = self.updated_at
            + ChronoDuration::seconds(processing_timeout.as_secs() as i64);
        now >= gate
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
