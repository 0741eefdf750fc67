use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info};

use crate::core::{AppError, DomainEvent, EventDispatcher};
use crate::modules::ledger::services::LedgerService;

/// Background job that re-derives every active account's balance from its
/// entry history and flags drift against the cached column.
///
/// Drift means a write path bypassed the ledger engine; the job reports it,
/// never repairs it.
pub struct LedgerReconciler {
    ledger: Arc<LedgerService>,
    dispatcher: Arc<EventDispatcher>,
    sweep_interval: Duration,
}

impl LedgerReconciler {
    pub fn new(
        ledger: Arc<LedgerService>,
        dispatcher: Arc<EventDispatcher>,
        sweep_interval_secs: u64,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }

    /// Spawned as a tokio task in main.rs.
    pub async fn start(self: Arc<Self>) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Starting ledger reconciler"
        );

        let mut ticker = interval(self.sweep_interval);

        loop {
            ticker.tick().await;

            match self.reconcile().await {
                Ok(0) => {}
                Ok(drifted) => {
                    error!(drifted = drifted, "Reconciliation found accounts with balance drift");
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation sweep failed");
                }
            }
        }
    }

    /// Runs one sweep and returns how many accounts disagree with their
    /// entry history.
    pub async fn reconcile(&self) -> Result<usize, AppError> {
        let reports = self.ledger.verify_all_accounts().await?;
        let mut drifted = 0;

        for report in &reports {
            if report.is_consistent() {
                continue;
            }
            drifted += 1;
            error!(
                account_id = %report.account_id,
                kind = %report.kind,
                cached_balance = %report.cached_balance,
                derived_balance = %report.derived_balance,
                "Account balance drift detected"
            );
            self.dispatcher
                .emit(DomainEvent::error(
                    format!(
                        "Account {} cached balance {} disagrees with derived balance {}",
                        report.account_id, report.cached_balance, report.derived_balance
                    ),
                    "balance_drift",
                ))
                .await;
        }

        Ok(drifted)
    }
}
