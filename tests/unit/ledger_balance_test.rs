//! Property tests for the double-entry invariant: no draft set that violates
//! Σ debits == Σ credits, positivity, or balance floors ever reaches storage.

use proptest::prelude::*;
use rust_decimal::Decimal;
use saldo::core::Currency;
use saldo::modules::ledger::models::{AccountKind, EntryDraft};
use saldo::modules::ledger::repositories::InMemoryLedgerRepository;
use saldo::modules::ledger::services::LedgerService;
use saldo::modules::payments::models::{Transaction, TransactionKind, TransactionStatus};
use saldo::modules::payments::repositories::{
    InMemoryTransactionRepository, TransactionRepository,
};
use std::sync::Arc;

struct Ledger {
    service: Arc<LedgerService>,
    transactions: InMemoryTransactionRepository,
}

fn ledger() -> Ledger {
    let transactions = InMemoryTransactionRepository::new();
    let repo = Arc::new(InMemoryLedgerRepository::new(transactions.clone()));
    Ledger {
        service: Arc::new(LedgerService::new(repo)),
        transactions,
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn pending_transaction(fix: &Ledger, amount: Decimal) -> Transaction {
    let transaction = Transaction::new(TransactionKind::Deposit, amount, Currency::IDR).unwrap();
    fix.transactions.create(&transaction).await.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A deposit split across any number of wallets settles, and afterwards
    /// every cached balance matches the sum of its entries.
    #[test]
    fn split_deposit_keeps_every_account_consistent(
        amounts in prop::collection::vec(1u32..100_000, 1..6),
    ) {
        runtime().block_on(async move {
            let fix = ledger();
            let total: u32 = amounts.iter().sum();

            let escrow = fix
                .service
                .open_account("platform", AccountKind::Escrow, Currency::IDR)
                .await
                .unwrap();
            let mut wallets = Vec::new();
            for i in 0..amounts.len() {
                let wallet = fix
                    .service
                    .open_account(&format!("worker-{}", i), AccountKind::Wallet, Currency::IDR)
                    .await
                    .unwrap();
                wallets.push(wallet);
            }

            let transaction = pending_transaction(&fix, Decimal::from(total)).await;
            let mut drafts = vec![EntryDraft::debit(&escrow.id, Decimal::from(total))];
            for (wallet, amount) in wallets.iter().zip(&amounts) {
                drafts.push(EntryDraft::credit(&wallet.id, Decimal::from(*amount)));
            }

            let settled = fix
                .service
                .settle(&transaction, &drafts, None)
                .await
                .unwrap();
            assert_eq!(settled.status, TransactionStatus::Settled);

            let escrow = fix.service.account(&escrow.id).await.unwrap();
            assert_eq!(escrow.balance, Decimal::from(total));
            assert!(fix.service.verify_account(&escrow).await.unwrap().is_consistent());

            for (wallet, amount) in wallets.iter().zip(&amounts) {
                let wallet = fix.service.account(&wallet.id).await.unwrap();
                assert_eq!(wallet.balance, Decimal::from(*amount));
                assert!(fix.service.verify_account(&wallet).await.unwrap().is_consistent());
            }
        });
    }

    /// Perturbing one leg by any amount makes the whole settlement abort with
    /// no entries and no balance movement.
    #[test]
    fn unbalanced_draft_set_never_writes(
        amounts in prop::collection::vec(1u32..100_000, 1..6),
        skew in 1u32..1_000,
    ) {
        runtime().block_on(async move {
            let fix = ledger();
            let total: u32 = amounts.iter().sum();

            let escrow = fix
                .service
                .open_account("platform", AccountKind::Escrow, Currency::IDR)
                .await
                .unwrap();
            let wallet = fix
                .service
                .open_account("worker-1", AccountKind::Wallet, Currency::IDR)
                .await
                .unwrap();

            let transaction = pending_transaction(&fix, Decimal::from(total)).await;
            let mut drafts = vec![EntryDraft::debit(&escrow.id, Decimal::from(total + skew))];
            for amount in &amounts {
                drafts.push(EntryDraft::credit(&wallet.id, Decimal::from(*amount)));
            }

            assert!(fix.service.settle(&transaction, &drafts, None).await.is_err());

            let entries = fix
                .service
                .entries_for_transaction(&transaction.id)
                .await
                .unwrap();
            assert!(entries.is_empty());

            let stored = fix
                .transactions
                .find_by_id(&transaction.id)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(stored.status, TransactionStatus::Pending);

            assert_eq!(
                fix.service.account(&escrow.id).await.unwrap().balance,
                Decimal::ZERO
            );
            assert_eq!(
                fix.service.account(&wallet.id).await.unwrap().balance,
                Decimal::ZERO
            );
        });
    }

    /// A balance may never go negative: an outflow larger than what a prior
    /// deposit funded aborts atomically, leaving the funded state untouched.
    #[test]
    fn overdraft_aborts_the_whole_settlement(
        seed in 1u32..50_000,
        overdraw in 1u32..50_000,
    ) {
        runtime().block_on(async move {
            let fix = ledger();
            let outflow = seed + overdraw;

            let escrow = fix
                .service
                .open_account("platform", AccountKind::Escrow, Currency::IDR)
                .await
                .unwrap();
            let wallet = fix
                .service
                .open_account("worker-1", AccountKind::Wallet, Currency::IDR)
                .await
                .unwrap();

            let deposit = pending_transaction(&fix, Decimal::from(seed)).await;
            fix.service
                .settle(
                    &deposit,
                    &[
                        EntryDraft::debit(&escrow.id, Decimal::from(seed)),
                        EntryDraft::credit(&wallet.id, Decimal::from(seed)),
                    ],
                    None,
                )
                .await
                .unwrap();

            let payout = Transaction::new(
                TransactionKind::Withdrawal,
                Decimal::from(outflow),
                Currency::IDR,
            )
            .unwrap();
            let payout = fix.transactions.create(&payout).await.unwrap();

            let err = fix
                .service
                .settle(
                    &payout,
                    &[
                        EntryDraft::debit(&wallet.id, Decimal::from(outflow)),
                        EntryDraft::credit(&escrow.id, Decimal::from(outflow)),
                    ],
                    None,
                )
                .await
                .unwrap_err();
            assert_eq!(err.error_code(), "invariant_violation");

            let wallet = fix.service.account(&wallet.id).await.unwrap();
            let escrow = fix.service.account(&escrow.id).await.unwrap();
            assert_eq!(wallet.balance, Decimal::from(seed));
            assert_eq!(escrow.balance, Decimal::from(seed));
            assert!(fix.service.verify_account(&wallet).await.unwrap().is_consistent());
        });
    }

    /// Zero and negative legs are rejected before anything is written.
    #[test]
    fn non_positive_leg_rejected(amount in 1u32..100_000) {
        runtime().block_on(async move {
            let fix = ledger();

            let escrow = fix
                .service
                .open_account("platform", AccountKind::Escrow, Currency::IDR)
                .await
                .unwrap();
            let wallet = fix
                .service
                .open_account("worker-1", AccountKind::Wallet, Currency::IDR)
                .await
                .unwrap();

            let transaction = pending_transaction(&fix, Decimal::from(amount)).await;
            let drafts = [
                EntryDraft::debit(&escrow.id, Decimal::from(amount)),
                EntryDraft::credit(&wallet.id, Decimal::from(amount)),
                EntryDraft::debit(&escrow.id, Decimal::ZERO),
                EntryDraft::credit(&wallet.id, Decimal::ZERO),
            ];

            assert!(fix.service.settle(&transaction, &drafts, None).await.is_err());
            assert!(fix
                .service
                .entries_for_transaction(&transaction.id)
                .await
                .unwrap()
                .is_empty());
        });
    }
}
