use crate::core::{AppError, DomainEvent, EventDispatcher, EventName, Result};
use crate::modules::idempotency::{AcquireOutcome, IdempotencyService};
use crate::modules::ledger::{HoldRelease, LedgerService};
use crate::modules::payments::models::{Transaction, TransactionKind};
use crate::modules::payments::repositories::TransactionRepository;
use crate::modules::providers::{
    PaymentProvider, ProviderPayment, ProviderPaymentStatus, ProviderRegistry, WebhookEvent,
    WebhookKind,
};
use serde_json::json;
use std::sync::Arc;

/// What the ingress should answer the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Claimed and applied; carries the committed processing summary.
    Processed(serde_json::Value),
    /// Redelivery of a committed event, acknowledged without reprocessing.
    Duplicate,
    /// Authentic but not actionable: irrelevant event type or malformed body.
    Ignored(String),
}

/// Turns raw webhook deliveries into ledger mutations, exactly once per
/// (provider, event id). Signature verification gates everything; the
/// idempotency claim brackets the mutation; ground truth comes from the
/// snapshot only when the provider's signed payload is trusted, otherwise
/// from a status fetch-back.
pub struct WebhookProcessor {
    providers: Arc<ProviderRegistry>,
    idempotency: Arc<IdempotencyService>,
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<LedgerService>,
    dispatcher: Arc<EventDispatcher>,
}

impl WebhookProcessor {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        idempotency: Arc<IdempotencyService>,
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<LedgerService>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            providers,
            idempotency,
            transactions,
            ledger,
            dispatcher,
        }
    }

    pub async fn process(
        &self,
        provider_name: &str,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let provider = self.providers.get(provider_name)?;

        let signature = signature.ok_or_else(|| {
            AppError::authentication(format!("Missing signature header for {}", provider_name))
        })?;
        if !provider.verify_signature(body, signature) {
            return Err(AppError::authentication(format!(
                "Invalid webhook signature for {}",
                provider_name
            )));
        }

        // Authentic but undecodable bodies are acknowledged so the provider
        // stops retrying; they never reach the claim store.
        let event = match provider.decode_webhook(body) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    provider = provider_name,
                    error = %err,
                    "Acknowledging malformed webhook body"
                );
                return Ok(WebhookOutcome::Ignored("malformed_payload".to_string()));
            }
        };

        let WebhookEvent { event_id, kind, .. } = event;
        let (payment_id, snapshot) = match kind {
            WebhookKind::Ignored { event_type } => {
                tracing::debug!(
                    provider = provider_name,
                    event_id = %event_id,
                    event_type = %event_type,
                    "Acknowledging irrelevant webhook event"
                );
                return Ok(WebhookOutcome::Ignored(event_type));
            }
            WebhookKind::PaymentUpdated {
                payment_id,
                snapshot,
            } => (payment_id, snapshot),
            WebhookKind::PayoutUpdated {
                payout_id,
                snapshot,
            } => (payout_id, snapshot),
        };

        let payload: serde_json::Value = serde_json::from_slice(body)?;
        match self
            .idempotency
            .try_acquire(provider_name, &event_id, &payload)
            .await?
        {
            AcquireOutcome::Duplicate(_) => return Ok(WebhookOutcome::Duplicate),
            AcquireOutcome::InProgress => {
                return Err(AppError::concurrent(format!(
                    "Event {} from {} is already being processed",
                    event_id, provider_name
                )))
            }
            AcquireOutcome::Acquired => {}
        }

        match self.apply(provider.as_ref(), &payment_id, snapshot).await {
            Ok(summary) => {
                self.idempotency
                    .commit_processed(provider_name, &event_id, summary.clone())
                    .await?;
                Ok(WebhookOutcome::Processed(summary))
            }
            Err(err) => {
                self.idempotency
                    .commit_failed(provider_name, &event_id, err.error_code(), &err.to_string())
                    .await?;
                self.dispatcher
                    .emit(
                        DomainEvent::error(err.to_string(), err.error_code())
                            .with_provider(provider_name),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Resolves ground truth and drives the matching transaction. Runs inside
    /// a held claim; its error commits the claim as failed.
    async fn apply(
        &self,
        provider: &dyn PaymentProvider,
        payment_id: &str,
        snapshot: Option<ProviderPayment>,
    ) -> Result<serde_json::Value> {
        let truth = match snapshot {
            Some(snapshot) if provider.trusts_webhook_payload() => snapshot,
            _ => provider.get_status(payment_id).await?,
        };

        let Some(transaction) = self
            .transactions
            .find_by_external_id(provider.name(), payment_id)
            .await?
        else {
            tracing::warn!(
                provider = provider.name(),
                payment_id = payment_id,
                "Webhook references a payment with no local transaction"
            );
            return Ok(json!({
                "result": "unknown_payment",
                "payment_id": payment_id,
            }));
        };

        if transaction.status.is_terminal() {
            return Ok(json!({
                "result": "already_terminal",
                "transaction_id": transaction.id,
                "status": transaction.status.to_string(),
            }));
        }

        if truth.amount != transaction.amount {
            return Err(AppError::validation(
                "amount_mismatch",
                format!(
                    "Provider reports {} for transaction {} recorded as {}",
                    truth.amount, transaction.id, transaction.amount
                ),
            ));
        }
        if truth.currency != transaction.currency {
            return Err(AppError::validation(
                "currency_mismatch",
                format!(
                    "Provider reports {} for transaction {} recorded as {}",
                    truth.currency, transaction.id, transaction.currency
                ),
            ));
        }

        match truth.status {
            ProviderPaymentStatus::Pending => Ok(json!({
                "result": "still_pending",
                "transaction_id": transaction.id,
            })),
            ProviderPaymentStatus::Approved => self.settle(provider, &transaction).await,
            ProviderPaymentStatus::Rejected => self.fail(provider, &transaction, &truth).await,
            ProviderPaymentStatus::Cancelled => self.cancel(provider, &transaction).await,
            ProviderPaymentStatus::Refunded => {
                if transaction.kind == TransactionKind::Refund {
                    self.settle(provider, &transaction).await
                } else {
                    tracing::warn!(
                        transaction_id = %transaction.id,
                        kind = %transaction.kind,
                        "Refunded status for a non-refund transaction, ignoring"
                    );
                    Ok(json!({
                        "result": "ignored_refund_status",
                        "transaction_id": transaction.id,
                    }))
                }
            }
        }
    }

    async fn settle(
        &self,
        provider: &dyn PaymentProvider,
        transaction: &Transaction,
    ) -> Result<serde_json::Value> {
        let event_name = match transaction.kind {
            TransactionKind::Deposit => EventName::PaymentApproved,
            TransactionKind::Refund => EventName::PaymentRefunded,
            TransactionKind::Withdrawal | TransactionKind::BookingPayout => {
                EventName::PayoutCompleted
            }
            other => {
                return Err(AppError::invariant(format!(
                    "{} transactions are never provider-confirmed",
                    other
                )))
            }
        };

        let drafts = transaction.settlement_drafts()?;
        let settled = self
            .ledger
            .settle(transaction, &drafts, payout_hold(transaction))
            .await?;
        self.dispatcher
            .emit(
                DomainEvent::for_transaction(
                    event_name,
                    &settled.id,
                    settled.amount,
                    settled.currency,
                )
                .with_provider(provider.name()),
            )
            .await;
        Ok(json!({
            "result": "settled",
            "transaction_id": settled.id,
        }))
    }

    async fn fail(
        &self,
        provider: &dyn PaymentProvider,
        transaction: &Transaction,
        truth: &ProviderPayment,
    ) -> Result<serde_json::Value> {
        let code = truth
            .error_code
            .clone()
            .unwrap_or_else(|| "provider_rejected".to_string());
        let message = truth
            .error_message
            .clone()
            .unwrap_or_else(|| format!("Rejected by {}", provider.name()));

        let failed = self
            .ledger
            .fail(transaction, &code, &message, payout_hold(transaction))
            .await?;
        let event_name = match failed.kind {
            TransactionKind::Deposit => EventName::PaymentRejected,
            TransactionKind::Withdrawal | TransactionKind::BookingPayout => EventName::PayoutFailed,
            _ => EventName::PaymentFailed,
        };
        self.dispatcher
            .emit(
                DomainEvent::for_transaction(
                    event_name,
                    &failed.id,
                    failed.amount,
                    failed.currency,
                )
                .with_provider(provider.name())
                .with_error(code, message),
            )
            .await;
        Ok(json!({
            "result": "failed",
            "transaction_id": failed.id,
            "error_code": failed.error_code,
        }))
    }

    async fn cancel(
        &self,
        provider: &dyn PaymentProvider,
        transaction: &Transaction,
    ) -> Result<serde_json::Value> {
        let cancelled = self
            .ledger
            .cancel(transaction, payout_hold(transaction))
            .await?;
        let event_name = match cancelled.kind {
            TransactionKind::Deposit => EventName::PaymentCancelled,
            TransactionKind::Withdrawal | TransactionKind::BookingPayout => EventName::PayoutFailed,
            _ => EventName::PaymentFailed,
        };
        self.dispatcher
            .emit(
                DomainEvent::for_transaction(
                    event_name,
                    &cancelled.id,
                    cancelled.amount,
                    cancelled.currency,
                )
                .with_provider(provider.name()),
            )
            .await;
        Ok(json!({
            "result": "cancelled",
            "transaction_id": cancelled.id,
        }))
    }
}

// Payout kinds hold their amount on the source wallet for their whole pending
// life; any terminal outcome must release it.
fn payout_hold(transaction: &Transaction) -> Option<HoldRelease> {
    match transaction.kind {
        TransactionKind::Withdrawal | TransactionKind::BookingPayout => transaction
            .source_account_id
            .as_ref()
            .map(|account_id| HoldRelease {
                account_id: account_id.clone(),
                amount: transaction.amount,
            }),
        _ => None,
    }
}
