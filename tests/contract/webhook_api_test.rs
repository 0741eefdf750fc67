//! HTTP contract of the webhook ingress, exercised through the real provider
//! adapters: authentication failures keep their 401, processed and duplicate
//! deliveries acknowledge with 200, and processing failures flatten to 500 so
//! the provider redelivers.

use actix_web::{http::StatusCode, test, web, App};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use saldo::core::Currency;
use saldo::modules::idempotency::repositories::{IdempotencyStore, InMemoryIdempotencyStore};
use saldo::modules::idempotency::services::IdempotencyService;
use saldo::modules::idempotency::IdempotencyStatus;
use saldo::modules::ledger::repositories::InMemoryLedgerRepository;
use saldo::modules::ledger::services::LedgerService;
use saldo::modules::ledger::AccountKind;
use saldo::modules::payments::controllers::webhook_controller;
use saldo::modules::payments::models::{Transaction, TransactionKind, TransactionStatus};
use saldo::modules::payments::repositories::{
    InMemoryTransactionRepository, TransactionRepository,
};
use saldo::modules::payments::services::WebhookProcessor;
use saldo::modules::providers::{
    provider_http_client, KirimpayProvider, NusapayProvider, ProviderRegistry, QrispayProvider,
};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;

const NUSAPAY_SECRET: &str = "nusapay_webhook_secret";
const QRISPAY_TOKEN: &str = "qrispay_callback_token";
const KIRIMPAY_KEY: &str = "kirimpay_webhook_key";

struct Fixture {
    processor: Arc<WebhookProcessor>,
    transactions: InMemoryTransactionRepository,
    ledger: Arc<LedgerService>,
    store: Arc<InMemoryIdempotencyStore>,
}

/// Real adapters against in-memory stores. The base URLs point nowhere;
/// every scenario below resolves before a status fetch would go out.
fn fixture() -> Fixture {
    let client = provider_http_client(Duration::from_secs(2)).unwrap();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(NusapayProvider::new(
        client.clone(),
        "test_api_key".to_string(),
        NUSAPAY_SECRET.to_string(),
        "http://127.0.0.1:1".to_string(),
    )));
    registry.register(Arc::new(QrispayProvider::new(
        client.clone(),
        "test_api_key".to_string(),
        QRISPAY_TOKEN.to_string(),
        "http://127.0.0.1:1".to_string(),
    )));
    registry.register(Arc::new(KirimpayProvider::new(
        client,
        "test_api_key".to_string(),
        KIRIMPAY_KEY.to_string(),
        "http://127.0.0.1:1".to_string(),
    )));

    let transactions = InMemoryTransactionRepository::new();
    let ledger_repo = Arc::new(InMemoryLedgerRepository::new(transactions.clone()));
    let ledger = Arc::new(LedgerService::new(ledger_repo));
    let store = Arc::new(InMemoryIdempotencyStore::new());
    let idempotency = Arc::new(IdempotencyService::new(
        store.clone(),
        Duration::from_secs(300),
        Duration::from_secs(90 * 86_400),
    ));

    let processor = Arc::new(WebhookProcessor::new(
        Arc::new(registry),
        idempotency,
        Arc::new(transactions.clone()),
        ledger.clone(),
        Arc::new(saldo::core::EventDispatcher::empty()),
    ));

    Fixture {
        processor,
        transactions,
        ledger,
        store,
    }
}

fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(NUSAPAY_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn nusapay_body(event_id: &str, charge_id: &str, status: &str, amount: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event_id": event_id,
        "event_type": "charge.updated",
        "charge": {
            "id": charge_id,
            "status": status,
            "amount": amount,
            "currency": "IDR",
        },
    }))
    .unwrap()
}

async fn pending_deposit(fix: &Fixture, provider: &str, external_id: &str, amount: Decimal) {
    let escrow = fix
        .ledger
        .open_account("platform", AccountKind::Escrow, Currency::IDR)
        .await
        .unwrap();
    let wallet = fix
        .ledger
        .open_account("client-1", AccountKind::Wallet, Currency::IDR)
        .await
        .unwrap();
    let transaction = Transaction::new(TransactionKind::Deposit, amount, Currency::IDR)
        .unwrap()
        .with_accounts(Some(escrow.id), Some(wallet.id))
        .with_provider(provider)
        .with_external_id(external_id);
    fix.transactions.create(&transaction).await.unwrap();
}

#[actix_web::test]
async fn missing_signature_header_is_unauthorized() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = nusapay_body("evt-1", "np-1", "approved", "50000");
    let req = test::TestRequest::post()
        .uri("/webhooks/nusapay")
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], "authentication_failed");
}

#[actix_web::test]
async fn invalid_nusapay_signature_is_unauthorized() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = nusapay_body("evt-1", "np-1", "approved", "50000");
    let req = test::TestRequest::post()
        .uri("/webhooks/nusapay")
        .insert_header(("X-Nusapay-Signature", "deadbeef"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn signed_nusapay_webhook_settles_the_payment() {
    let fix = fixture();
    pending_deposit(&fix, "nusapay", "np-1", dec!(50000)).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = nusapay_body("evt-1", "np-1", "approved", "50000");
    let req = test::TestRequest::post()
        .uri("/webhooks/nusapay")
        .insert_header(("X-Nusapay-Signature", sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "processed");
    assert_eq!(ack["result"]["result"], "settled");

    let transaction = fix
        .transactions
        .find_by_external_id("nusapay", "np-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Settled);
    let entries = fix
        .ledger
        .entries_for_transaction(&transaction.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[actix_web::test]
async fn redelivery_is_acknowledged_as_duplicate() {
    let fix = fixture();
    pending_deposit(&fix, "nusapay", "np-1", dec!(50000)).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = nusapay_body("evt-1", "np-1", "approved", "50000");
    for expected in ["processed", "duplicate"] {
        let req = test::TestRequest::post()
            .uri("/webhooks/nusapay")
            .insert_header(("X-Nusapay-Signature", sign(&body)))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let ack: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(ack["status"], expected);
    }

    let transaction = fix
        .transactions
        .find_by_external_id("nusapay", "np-1")
        .await
        .unwrap()
        .unwrap();
    let entries = fix
        .ledger
        .entries_for_transaction(&transaction.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
}

#[actix_web::test]
async fn irrelevant_event_type_is_acknowledged_as_ignored() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = serde_json::to_vec(&json!({
        "event_id": "evt-1",
        "event_type": "charge.created",
    }))
    .unwrap();
    let req = test::TestRequest::post()
        .uri("/webhooks/nusapay")
        .insert_header(("X-Nusapay-Signature", sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "ignored");
    assert_eq!(ack["reason"], "charge.created");
}

#[actix_web::test]
async fn amount_mismatch_is_a_server_error_with_a_failed_claim() {
    let fix = fixture();
    pending_deposit(&fix, "nusapay", "np-1", dec!(50000)).await;
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let body = nusapay_body("evt-1", "np-1", "approved", "60000");
    let req = test::TestRequest::post()
        .uri("/webhooks/nusapay")
        .insert_header(("X-Nusapay-Signature", sign(&body)))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["error"]["code"], "amount_mismatch");

    let claim = fix.store.find("nusapay", "evt-1").await.unwrap().unwrap();
    assert_eq!(claim.status, IdempotencyStatus::Failed);

    let transaction = fix
        .transactions
        .find_by_external_id("nusapay", "np-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn qrispay_wrong_token_is_unauthorized() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/webhooks/qrispay")
        .insert_header(("X-Callback-Token", "wrong_token"))
        .set_payload(r#"{"event_id":"evt-1","event":"charge.updated","charge_id":"qp-1"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn qrispay_malformed_body_is_acknowledged_as_ignored() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/webhooks/qrispay")
        .insert_header(("X-Callback-Token", QRISPAY_TOKEN))
        .set_payload("definitely not json")
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "ignored");
    assert_eq!(ack["reason"], "malformed_payload");
}

#[actix_web::test]
async fn kirimpay_wrong_key_is_unauthorized() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/webhooks/kirimpay")
        .insert_header(("X-Api-Key", "wrong_key"))
        .set_payload(r#"{"event_id":"evt-1","event":"disbursement.updated","disbursement_id":"kp-1"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn kirimpay_irrelevant_event_is_acknowledged() {
    let fix = fixture();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(fix.processor.clone()))
            .configure(webhook_controller::configure),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/webhooks/kirimpay")
        .insert_header(("X-Api-Key", KIRIMPAY_KEY))
        .set_payload(r#"{"event_id":"evt-1","event":"disbursement.created"}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["status"], "ignored");
    assert_eq!(ack["reason"], "disbursement.created");
}
