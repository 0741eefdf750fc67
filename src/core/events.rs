use crate::core::currency::Currency;
use crate::core::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Domain event names. The set is closed: subscribers register against these
/// variants at startup, so every (event, subscriber) edge is known statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventName {
    #[serde(rename = "payment.approved")]
    PaymentApproved,
    #[serde(rename = "payment.rejected")]
    PaymentRejected,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
    #[serde(rename = "payment.cancelled")]
    PaymentCancelled,
    #[serde(rename = "payout.completed")]
    PayoutCompleted,
    #[serde(rename = "payout.failed")]
    PayoutFailed,
    #[serde(rename = "payment.error")]
    PaymentError,
}

impl EventName {
    pub const ALL: [EventName; 8] = [
        EventName::PaymentApproved,
        EventName::PaymentRejected,
        EventName::PaymentFailed,
        EventName::PaymentRefunded,
        EventName::PaymentCancelled,
        EventName::PayoutCompleted,
        EventName::PayoutFailed,
        EventName::PaymentError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::PaymentApproved => "payment.approved",
            EventName::PaymentRejected => "payment.rejected",
            EventName::PaymentFailed => "payment.failed",
            EventName::PaymentRefunded => "payment.refunded",
            EventName::PaymentCancelled => "payment.cancelled",
            EventName::PayoutCompleted => "payout.completed",
            EventName::PayoutFailed => "payout.failed",
            EventName::PaymentError => "payment.error",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event payload handed to subscribers after a state transition has
/// already committed. Subscribers must treat it as a notification, not a
/// command: nothing they do can roll the transition back.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub name: EventName,
    pub transaction_id: Option<String>,
    pub provider: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<Currency>,
    pub error_code: Option<String>,
    pub message: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(name: EventName) -> Self {
        Self {
            name,
            transaction_id: None,
            provider: None,
            amount: None,
            currency: None,
            error_code: None,
            message: None,
            occurred_at: Utc::now(),
        }
    }

    /// Event tied to a transaction lifecycle transition.
    pub fn for_transaction(
        name: EventName,
        transaction_id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            amount: Some(amount),
            currency: Some(currency),
            ..Self::new(name)
        }
    }

    /// Generic operational error event (subscriber failures, reconciliation
    /// drift, webhook processing errors).
    pub fn error(message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.into()),
            message: Some(message.into()),
            ..Self::new(EventName::PaymentError)
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.message = Some(message.into());
        self
    }
}

/// A side-effect handler for domain events (notifications, booking status
/// sync, analytics). Runs inline with the emitting request.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Stable name used in logs when this subscriber fails.
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError>;
}

/// Builds the subscriber registry at startup. Once built, the dispatcher is
/// immutable, so the full event graph is fixed before the first request.
#[derive(Default)]
pub struct EventDispatcherBuilder {
    subscribers: HashMap<EventName, Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(mut self, name: EventName, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.entry(name).or_default().push(subscriber);
        self
    }

    pub fn build(self) -> EventDispatcher {
        EventDispatcher {
            subscribers: self.subscribers,
        }
    }
}

/// Synchronous in-process fan-out. Subscribers for an event run sequentially
/// in registration order; a failing subscriber is logged and surfaced as a
/// `payment.error` event, and never prevents its siblings from running.
pub struct EventDispatcher {
    subscribers: HashMap<EventName, Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Dispatcher with no subscribers; emit becomes a no-op.
    pub fn empty() -> Self {
        EventDispatcherBuilder::new().build()
    }

    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.subscribers.get(&name).map_or(0, Vec::len)
    }

    /// Delivers the event to every registered subscriber. Never returns an
    /// error: the emitting transition has already committed and must not be
    /// unwound by notification failures.
    pub async fn emit(&self, event: DomainEvent) {
        let failures = self.fan_out(&event).await;

        // Failures inside payment.error handlers are only logged, otherwise a
        // broken error subscriber would loop forever.
        if event.name == EventName::PaymentError {
            return;
        }

        for (subscriber, err) in failures {
            let error_event = DomainEvent::error(
                format!(
                    "subscriber {} failed handling {}: {}",
                    subscriber, event.name, err
                ),
                err.error_code().to_string(),
            );
            self.fan_out(&error_event).await;
        }
    }

    async fn fan_out(&self, event: &DomainEvent) -> Vec<(String, AppError)> {
        let mut failures = Vec::new();

        let Some(subscribers) = self.subscribers.get(&event.name) else {
            return failures;
        };

        for subscriber in subscribers {
            if let Err(err) = subscriber.handle(event).await {
                error!(
                    subscriber = subscriber.name(),
                    event = event.name.as_str(),
                    transaction_id = event.transaction_id.as_deref().unwrap_or("-"),
                    error = %err,
                    "event subscriber failed"
                );
                failures.push((subscriber.name().to_string(), err));
            }
        }

        failures
    }
}

/// Writes every event to the structured log. Registered for all event names
/// at startup so transitions leave an audit trail even before any
/// domain-specific subscribers exist.
pub struct EventLogSubscriber;

#[async_trait]
impl EventSubscriber for EventLogSubscriber {
    fn name(&self) -> &str {
        "event_log"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), AppError> {
        if event.name == EventName::PaymentError {
            error!(
                event = event.name.as_str(),
                transaction_id = event.transaction_id.as_deref().unwrap_or("-"),
                error_code = event.error_code.as_deref().unwrap_or("-"),
                message = event.message.as_deref().unwrap_or("-"),
                "Domain event"
            );
        } else {
            tracing::info!(
                event = event.name.as_str(),
                transaction_id = event.transaction_id.as_deref().unwrap_or("-"),
                provider = event.provider.as_deref().unwrap_or("-"),
                amount = %event.amount.unwrap_or_default(),
                "Domain event"
            );
        }
        Ok(())
    }
}
