//! End-to-end charge lifecycle: QR charges stay pending until the webhook
//! confirms them through a fetch-back; card charges resolve inside the create
//! call; terminal failures never touch the ledger.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{charge_request, payment_body, rejected, sandbox_payment, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use saldo::core::AppError;
use saldo::modules::ledger::EntryType;
use saldo::modules::payments::models::TransactionStatus;
use saldo::modules::payments::repositories::TransactionRepository;
use saldo::modules::payments::services::WebhookOutcome;
use saldo::modules::providers::{PaymentMethod, ProviderPaymentStatus};

#[tokio::test]
async fn qr_charge_settles_through_webhook_fetch_back() {
    let h = Harness::new();
    h.qr.push_charge(Ok(sandbox_payment(
        "qp-1",
        dec!(50000),
        ProviderPaymentStatus::Pending,
    )
    .with_qr_string("00020101021226660014ID.CO.QRIS.WWW")));

    let outcome = h
        .orchestrator
        .charge(charge_request("client-1", PaymentMethod::Dana, dec!(50000)))
        .await
        .unwrap();
    assert_eq!(outcome.transaction.status, TransactionStatus::Pending);
    assert_eq!(
        outcome.qr_string.as_deref(),
        Some("00020101021226660014ID.CO.QRIS.WWW")
    );
    assert_eq!(h.entry_count(&outcome.transaction.id).await, 0);

    // The thin QrisPay-style payload forces one status fetch for ground truth
    h.qr.set_status(sandbox_payment(
        "qp-1",
        dec!(50000),
        ProviderPaymentStatus::Approved,
    ));
    let ack = h
        .deliver("qrpay", &payment_body("evt-1", "qp-1"))
        .await
        .unwrap();
    let WebhookOutcome::Processed(summary) = &ack else {
        panic!("expected processed outcome, got {:?}", ack);
    };
    assert_eq!(summary["result"], "settled");
    assert_eq!(h.qr.status_fetches(), 1);

    let transaction = h
        .transactions
        .find_by_id(&outcome.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Settled);

    let escrow = h.escrow().await;
    let wallet = h.wallet("client-1").await;
    let entries = h
        .ledger
        .entries_for_transaction(&transaction.id)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .any(|e| e.entry_type == EntryType::Debit && e.account_id == escrow.id));
    assert!(entries
        .iter()
        .any(|e| e.entry_type == EntryType::Credit && e.account_id == wallet.id));
    assert_eq!(escrow.balance, dec!(50000));
    assert_eq!(wallet.balance, dec!(50000));
    assert_eq!(h.events.count("payment.approved"), 1);
}

#[tokio::test]
async fn declined_card_charge_records_the_failure_without_entries() {
    let h = Harness::new();
    h.card.push_charge(Ok(rejected(
        "np-1",
        dec!(250000),
        "card_declined",
        "Issuer declined the card",
    )));

    let outcome = h
        .orchestrator
        .charge(charge_request("client-1", PaymentMethod::Card, dec!(250000)))
        .await
        .unwrap();

    assert_eq!(outcome.transaction.status, TransactionStatus::Failed);
    assert_eq!(outcome.transaction.error_code.as_deref(), Some("card_declined"));
    assert_eq!(h.entry_count(&outcome.transaction.id).await, 0);
    assert_eq!(h.wallet("client-1").await.balance, Decimal::ZERO);
    assert_eq!(h.events.count("payment.failed"), 1);
    assert_eq!(h.events.count("payment.approved"), 0);
}

#[tokio::test]
async fn unreachable_provider_fails_the_charge() {
    let h = Harness::new();
    h.card.push_charge(Err(AppError::provider_unavailable(
        "cardpay",
        "connect timeout",
    )));

    let err = h
        .orchestrator
        .charge(charge_request("client-1", PaymentMethod::Card, dec!(100000)))
        .await
        .unwrap_err();

    assert!(err.is_provider_unavailable());
    assert_eq!(h.events.count("payment.failed"), 1);
    assert_eq!(h.wallet("client-1").await.balance, Decimal::ZERO);
    assert_eq!(h.escrow().await.balance, Decimal::ZERO);
}

#[tokio::test]
async fn webhook_rejection_fails_the_pending_charge() {
    let h = Harness::new();
    h.qr.push_charge(Ok(sandbox_payment(
        "qp-1",
        dec!(50000),
        ProviderPaymentStatus::Pending,
    )));
    let outcome = h
        .orchestrator
        .charge(charge_request("client-1", PaymentMethod::Ovo, dec!(50000)))
        .await
        .unwrap();

    h.qr.set_status(rejected("qp-1", dec!(50000), "expired", "QR code expired"));
    let ack = h
        .deliver("qrpay", &payment_body("evt-1", "qp-1"))
        .await
        .unwrap();
    let WebhookOutcome::Processed(summary) = &ack else {
        panic!("expected processed outcome, got {:?}", ack);
    };
    assert_eq!(summary["result"], "failed");

    let transaction = h
        .transactions
        .find_by_id(&outcome.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Failed);
    assert_eq!(transaction.error_code.as_deref(), Some("expired"));
    assert_eq!(h.entry_count(&transaction.id).await, 0);
    assert_eq!(h.events.count("payment.rejected"), 1);
}

#[tokio::test]
async fn webhook_cancellation_cancels_the_pending_charge() {
    let h = Harness::new();
    h.qr.push_charge(Ok(sandbox_payment(
        "qp-1",
        dec!(50000),
        ProviderPaymentStatus::Pending,
    )));
    let outcome = h
        .orchestrator
        .charge(charge_request("client-1", PaymentMethod::Dana, dec!(50000)))
        .await
        .unwrap();

    h.qr.set_status(sandbox_payment(
        "qp-1",
        dec!(50000),
        ProviderPaymentStatus::Cancelled,
    ));
    let ack = h
        .deliver("qrpay", &payment_body("evt-1", "qp-1"))
        .await
        .unwrap();
    let WebhookOutcome::Processed(summary) = &ack else {
        panic!("expected processed outcome, got {:?}", ack);
    };
    assert_eq!(summary["result"], "cancelled");

    let transaction = h
        .transactions
        .find_by_id(&outcome.transaction.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Cancelled);
    assert_eq!(h.entry_count(&transaction.id).await, 0);
    assert_eq!(h.events.count("payment.cancelled"), 1);
}
