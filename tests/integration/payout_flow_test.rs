//! Payout lifecycle: KYC and bank-account gates reject before any record
//! exists, the wallet hold brackets the pending window, and webhook outcomes
//! release it on settle and fail alike.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{payout_body, payout_request, rejected, sandbox_payment, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use saldo::modules::identity::VerificationStatus;
use saldo::modules::payments::models::{TransactionKind, TransactionStatus};
use saldo::modules::payments::repositories::TransactionRepository;
use saldo::modules::payments::services::WebhookOutcome;
use saldo::modules::providers::ProviderPaymentStatus;

#[tokio::test]
async fn payout_requires_approved_kyc() {
    let h = Harness::new();
    h.users
        .insert_user("worker-1", VerificationStatus::Pending, Some(helpers::bank_account()))
        .await;
    h.fund_wallet("worker-1", "np-1", dec!(100000)).await;
    h.events.clear();

    let err = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(50000)))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "kyc_not_approved");
    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.balance, dec!(100000));
    assert_eq!(wallet.frozen_balance, Decimal::ZERO);
    assert!(h.events.names().is_empty());
}

#[tokio::test]
async fn payout_requires_a_bank_account_on_file() {
    let h = Harness::new();
    h.users
        .insert_user("worker-1", VerificationStatus::Approved, None)
        .await;
    h.fund_wallet("worker-1", "np-1", dec!(100000)).await;

    let err = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(50000)))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "bank_account_missing");
    assert_eq!(h.wallet("worker-1").await.frozen_balance, Decimal::ZERO);
}

#[tokio::test]
async fn payout_beyond_available_funds_is_rejected() {
    let h = Harness::new();
    h.register_payee("worker-1").await;
    h.fund_wallet("worker-1", "np-1", dec!(50000)).await;

    let err = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(60000)))
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "insufficient_funds");
    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.balance, dec!(50000));
    assert_eq!(wallet.frozen_balance, Decimal::ZERO);
}

#[tokio::test]
async fn pending_payout_holds_funds_until_the_webhook_completes_it() {
    let h = Harness::new();
    h.register_payee("worker-1").await;
    h.fund_wallet("worker-1", "np-1", dec!(100000)).await;
    h.events.clear();

    h.bank.push_payout(Ok(sandbox_payment(
        "kp-1",
        dec!(60000),
        ProviderPaymentStatus::Pending,
    )));
    let payout = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(60000)))
        .await
        .unwrap();
    assert_eq!(payout.kind, TransactionKind::Withdrawal);
    assert_eq!(payout.status, TransactionStatus::Pending);
    assert_eq!(payout.external_id.as_deref(), Some("kp-1"));

    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.frozen_balance, dec!(60000));
    assert_eq!(wallet.available_balance(), dec!(40000));

    h.bank.set_status(sandbox_payment(
        "kp-1",
        dec!(60000),
        ProviderPaymentStatus::Approved,
    ));
    let ack = h
        .deliver("bankpay", &payout_body("evt-1", "kp-1"))
        .await
        .unwrap();
    let WebhookOutcome::Processed(summary) = &ack else {
        panic!("expected processed outcome, got {:?}", ack);
    };
    assert_eq!(summary["result"], "settled");

    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.balance, dec!(40000));
    assert_eq!(wallet.frozen_balance, Decimal::ZERO);
    assert_eq!(h.escrow().await.balance, dec!(40000));
    assert_eq!(h.entry_count(&payout.id).await, 2);
    assert_eq!(h.events.count("payout.completed"), 1);
    assert!(h
        .ledger
        .verify_account(&wallet)
        .await
        .unwrap()
        .is_consistent());
}

#[tokio::test]
async fn failed_payout_releases_the_hold() {
    let h = Harness::new();
    h.register_payee("worker-1").await;
    h.fund_wallet("worker-1", "np-1", dec!(100000)).await;
    h.events.clear();

    h.bank.push_payout(Ok(sandbox_payment(
        "kp-1",
        dec!(60000),
        ProviderPaymentStatus::Pending,
    )));
    let payout = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(60000)))
        .await
        .unwrap();

    h.bank.set_status(rejected(
        "kp-1",
        dec!(60000),
        "invalid_account",
        "Destination account rejected the transfer",
    ));
    let ack = h
        .deliver("bankpay", &payout_body("evt-1", "kp-1"))
        .await
        .unwrap();
    let WebhookOutcome::Processed(summary) = &ack else {
        panic!("expected processed outcome, got {:?}", ack);
    };
    assert_eq!(summary["result"], "failed");

    let stored = h
        .transactions
        .find_by_id(&payout.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, TransactionStatus::Failed);
    assert_eq!(stored.error_code.as_deref(), Some("invalid_account"));

    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.balance, dec!(100000));
    assert_eq!(wallet.frozen_balance, Decimal::ZERO);
    assert_eq!(h.entry_count(&payout.id).await, 0);
    assert_eq!(h.events.count("payout.failed"), 1);
}

#[tokio::test]
async fn synchronously_approved_payout_settles_in_the_call() {
    let h = Harness::new();
    h.register_payee("worker-1").await;
    h.fund_wallet("worker-1", "np-1", dec!(100000)).await;
    h.events.clear();

    h.bank.push_payout(Ok(sandbox_payment(
        "kp-1",
        dec!(25000),
        ProviderPaymentStatus::Approved,
    )));
    let payout = h
        .orchestrator
        .payout(payout_request("worker-1", dec!(25000)))
        .await
        .unwrap();

    assert_eq!(payout.status, TransactionStatus::Settled);
    let wallet = h.wallet("worker-1").await;
    assert_eq!(wallet.balance, dec!(75000));
    assert_eq!(wallet.frozen_balance, Decimal::ZERO);
    assert_eq!(h.entry_count(&payout.id).await, 2);
    assert_eq!(h.events.count("payout.completed"), 1);
}
