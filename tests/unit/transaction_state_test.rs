//! Transaction lifecycle properties: the transition matrix, terminal
//! absorption under arbitrary sequences, refund eligibility, and the
//! universal settlement-draft shape.

use proptest::prelude::*;
use rust_decimal::Decimal;
use saldo::core::Currency;
use saldo::modules::ledger::models::{validate_balanced, EntryType};
use saldo::modules::payments::models::{Transaction, TransactionKind, TransactionStatus};

const KINDS: [TransactionKind; 6] = [
    TransactionKind::Deposit,
    TransactionKind::Withdrawal,
    TransactionKind::BookingPayout,
    TransactionKind::Refund,
    TransactionKind::InternalTransfer,
    TransactionKind::Adjustment,
];

const STATUSES: [TransactionStatus; 5] = [
    TransactionStatus::Pending,
    TransactionStatus::Processing,
    TransactionStatus::Settled,
    TransactionStatus::Failed,
    TransactionStatus::Cancelled,
];

fn deposit() -> Transaction {
    Transaction::new(TransactionKind::Deposit, Decimal::from(50_000u32), Currency::IDR)
        .expect("valid transaction")
}

#[test]
fn transition_matrix_is_exact() {
    for from in STATUSES {
        for to in STATUSES {
            let expected = match from {
                TransactionStatus::Pending => to != TransactionStatus::Pending,
                TransactionStatus::Processing => matches!(
                    to,
                    TransactionStatus::Settled
                        | TransactionStatus::Failed
                        | TransactionStatus::Cancelled
                ),
                _ => false,
            };
            assert_eq!(
                from.can_transition_to(to),
                expected,
                "transition {} -> {}",
                from,
                to
            );
        }
    }
}

#[test]
fn only_settled_deposits_are_refundable() {
    for kind in KINDS {
        for status in STATUSES {
            let mut tx =
                Transaction::new(kind, Decimal::from(1_000u32), Currency::IDR).unwrap();
            tx.status = status;

            let expected =
                kind == TransactionKind::Deposit && status == TransactionStatus::Settled;
            assert_eq!(tx.can_refund(), expected, "{} in {}", kind, status);
        }
    }
}

#[test]
fn settlement_drafts_are_one_balanced_pair_for_every_kind() {
    for kind in KINDS {
        let tx = Transaction::new(kind, Decimal::from(7_500u32), Currency::IDR)
            .unwrap()
            .with_accounts(Some("acc-source".into()), Some("acc-destination".into()));

        let drafts = tx.settlement_drafts().unwrap();
        assert_eq!(drafts.len(), 2, "{}", kind);
        assert_eq!(drafts[0].account_id, "acc-source");
        assert_eq!(drafts[0].entry_type, EntryType::Debit);
        assert_eq!(drafts[1].account_id, "acc-destination");
        assert_eq!(drafts[1].entry_type, EntryType::Credit);
        assert!(drafts.iter().all(|d| d.amount == tx.amount));
        validate_balanced(&drafts).unwrap();
    }
}

#[test]
fn settlement_drafts_require_both_accounts() {
    let no_source = deposit().with_accounts(None, Some("acc-wallet".into()));
    assert!(no_source.settlement_drafts().is_err());

    let no_destination = deposit().with_accounts(Some("acc-escrow".into()), None);
    assert!(no_destination.settlement_drafts().is_err());
}

#[test]
fn failure_after_settlement_is_rejected() {
    let mut tx = deposit();
    tx.transition(TransactionStatus::Settled).unwrap();
    assert!(tx.mark_failed("late_webhook", "Provider reversed its answer").is_err());
    assert_eq!(tx.status, TransactionStatus::Settled);
    assert!(tx.error_code.is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Whatever sequence of transitions is attempted, the first terminal
    /// status absorbs the transaction: later attempts error and change
    /// nothing, and `settled_at` is set exactly when the terminal is SETTLED.
    #[test]
    fn terminal_states_absorb_every_sequence(
        attempts in prop::collection::vec(prop::sample::select(STATUSES.to_vec()), 1..12),
    ) {
        let mut tx = deposit();
        let mut first_terminal: Option<TransactionStatus> = None;

        for next in attempts {
            let before = tx.status;
            let result = tx.transition(next);

            if let Some(terminal) = first_terminal {
                assert!(result.is_err());
                assert_eq!(tx.status, terminal);
                continue;
            }

            match result {
                Ok(()) => {
                    assert!(before.can_transition_to(next));
                    if next.is_terminal() {
                        first_terminal = Some(next);
                    }
                }
                Err(_) => assert_eq!(tx.status, before),
            }
        }

        assert_eq!(
            tx.settled_at.is_some(),
            tx.status == TransactionStatus::Settled
        );
    }
}
