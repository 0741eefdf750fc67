//! Full service wiring over in-memory stores: three sandbox providers, the
//! orchestrator, and the webhook processor sharing one ledger and one claim
//! store, the way main.rs assembles the real thing.

use super::sandbox::{sandbox_payment, SandboxProvider, SIGNATURE};
use rust_decimal::Decimal;
use saldo::core::{
    AppError, Currency, DomainEvent, EventDispatcherBuilder, EventName, EventSubscriber, Result,
};
use saldo::modules::idempotency::repositories::InMemoryIdempotencyStore;
use saldo::modules::idempotency::services::IdempotencyService;
use saldo::modules::identity::{BankAccount, InMemoryUserDirectory, VerificationStatus};
use saldo::modules::ledger::repositories::InMemoryLedgerRepository;
use saldo::modules::ledger::services::LedgerService;
use saldo::modules::ledger::{Account, AccountKind};
use saldo::modules::payments::models::Transaction;
use saldo::modules::payments::repositories::InMemoryTransactionRepository;
use saldo::modules::payments::services::{
    ChargeRequest, CommissionPolicy, PaymentOrchestrator, PayoutRequest, RoutingConfig,
    TransferRequest, WebhookOutcome, WebhookProcessor,
};
use saldo::modules::providers::{PaymentMethod, ProviderPaymentStatus, ProviderRegistry};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PLATFORM: &str = "platform";
pub const RETENTION: Duration = Duration::from_secs(90 * 86_400);

/// Records every emitted domain event name, in order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn names(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

struct Recorder {
    log: EventLog,
}

#[async_trait]
impl EventSubscriber for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), AppError> {
        self.log
            .0
            .lock()
            .unwrap()
            .push(event.name.as_str().to_string());
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub processor: Arc<WebhookProcessor>,
    pub transactions: InMemoryTransactionRepository,
    pub ledger: Arc<LedgerService>,
    pub store: Arc<InMemoryIdempotencyStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub card: Arc<SandboxProvider>,
    pub qr: Arc<SandboxProvider>,
    pub bank: Arc<SandboxProvider>,
    pub events: EventLog,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_processing_timeout(Duration::from_secs(300))
    }

    pub fn with_processing_timeout(processing_timeout: Duration) -> Self {
        let transactions = InMemoryTransactionRepository::new();
        let ledger_repo = Arc::new(InMemoryLedgerRepository::new(transactions.clone()));
        let ledger = Arc::new(LedgerService::new(ledger_repo));
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let idempotency = Arc::new(IdempotencyService::new(
            store.clone(),
            processing_timeout,
            RETENTION,
        ));
        let users = Arc::new(InMemoryUserDirectory::new());

        // Card rail signs full snapshots; QR and bank rails send thin
        // payloads that force a fetch-back, mirroring the production trio.
        let card = Arc::new(SandboxProvider::trusted(
            "cardpay",
            vec![PaymentMethod::Card],
        ));
        let qr = Arc::new(SandboxProvider::untrusted(
            "qrpay",
            vec![PaymentMethod::Dana, PaymentMethod::Ovo],
        ));
        let bank = Arc::new(SandboxProvider::untrusted(
            "bankpay",
            vec![PaymentMethod::BankTransfer],
        ));

        let mut registry = ProviderRegistry::new();
        registry.register(card.clone());
        registry.register(qr.clone());
        registry.register(bank.clone());
        let providers = Arc::new(registry);

        let events = EventLog::default();
        let recorder: Arc<dyn EventSubscriber> = Arc::new(Recorder {
            log: events.clone(),
        });
        let dispatcher = Arc::new(
            EventName::ALL
                .into_iter()
                .fold(EventDispatcherBuilder::new(), |builder, name| {
                    builder.subscribe(name, recorder.clone())
                })
                .build(),
        );

        let routing = RoutingConfig {
            card_provider: "cardpay".to_string(),
            qr_provider: "qrpay".to_string(),
            payout_provider: "bankpay".to_string(),
            charge_fallback: None,
        };

        let orchestrator = Arc::new(PaymentOrchestrator::new(
            Arc::new(transactions.clone()),
            ledger.clone(),
            providers.clone(),
            users.clone(),
            dispatcher.clone(),
            routing,
            Some(CommissionPolicy::new(1_000)),
            PLATFORM,
        ));
        let processor = Arc::new(WebhookProcessor::new(
            providers,
            idempotency,
            Arc::new(transactions.clone()),
            ledger.clone(),
            dispatcher,
        ));

        Harness {
            orchestrator,
            processor,
            transactions,
            ledger,
            store,
            users,
            card,
            qr,
            bank,
            events,
        }
    }

    /// Delivers a webhook body with the valid sandbox signature.
    pub async fn deliver(&self, provider: &str, body: &[u8]) -> Result<WebhookOutcome> {
        self.processor.process(provider, body, Some(SIGNATURE)).await
    }

    /// Settles a card deposit so the user's wallet has funds to move.
    pub async fn fund_wallet(
        &self,
        user_id: &str,
        external_id: &str,
        amount: Decimal,
    ) -> Transaction {
        self.card.push_charge(Ok(sandbox_payment(
            external_id,
            amount,
            ProviderPaymentStatus::Approved,
        )));
        self.orchestrator
            .charge(charge_request(user_id, PaymentMethod::Card, amount))
            .await
            .unwrap()
            .transaction
    }

    pub async fn register_payee(&self, user_id: &str) {
        self.users
            .insert_user(user_id, VerificationStatus::Approved, Some(bank_account()))
            .await;
    }

    pub async fn wallet(&self, user_id: &str) -> Account {
        self.ledger
            .open_account(user_id, AccountKind::Wallet, Currency::IDR)
            .await
            .unwrap()
    }

    pub async fn escrow(&self) -> Account {
        self.ledger
            .open_account(PLATFORM, AccountKind::Escrow, Currency::IDR)
            .await
            .unwrap()
    }

    pub async fn entry_count(&self, transaction_id: &str) -> usize {
        self.ledger
            .entries_for_transaction(transaction_id)
            .await
            .unwrap()
            .len()
    }
}

pub fn charge_request(user_id: &str, method: PaymentMethod, amount: Decimal) -> ChargeRequest {
    ChargeRequest {
        client_user_id: user_id.to_string(),
        amount,
        currency: Currency::IDR,
        method,
        booking_id: None,
        description: None,
        metadata: None,
    }
}

pub fn payout_request(user_id: &str, amount: Decimal) -> PayoutRequest {
    PayoutRequest {
        destination_user_id: user_id.to_string(),
        amount,
        currency: Currency::IDR,
        booking_id: None,
        description: None,
        metadata: None,
    }
}

pub fn transfer_request(from: &str, to: &str, amount: Decimal) -> TransferRequest {
    TransferRequest {
        from_user_id: from.to_string(),
        to_user_id: to.to_string(),
        amount,
        currency: Currency::IDR,
        booking_id: None,
        metadata: None,
    }
}

pub fn bank_account() -> BankAccount {
    BankAccount {
        bank_code: "BCA".to_string(),
        account_number: "1234567890".to_string(),
        account_holder: "Test Payee".to_string(),
    }
}
