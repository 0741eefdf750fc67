use crate::core::{AppError, Currency, DomainEvent, EventDispatcher, EventName, Result};
use crate::modules::identity::UserDirectory;
use crate::modules::ledger::{AccountKind, EntryDraft, HoldRelease, LedgerEntry, LedgerService};
use crate::modules::payments::models::{Transaction, TransactionKind, TransactionStatus};
use crate::modules::payments::repositories::TransactionRepository;
use crate::modules::providers::{
    PaymentMethod, PaymentProvider, ProviderChargeRequest, ProviderPaymentStatus,
    ProviderPayoutRequest, ProviderRegistry,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Provider routing table. Names must match registered provider names.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub card_provider: String,
    pub qr_provider: String,
    pub payout_provider: String,
    /// Tried once when the primary charge provider is unreachable. Never
    /// applied to payouts or business rejections.
    pub charge_fallback: Option<String>,
}

/// Platform commission on escrow releases, in basis points.
#[derive(Debug, Clone, Copy)]
pub struct CommissionPolicy {
    rate_bps: u32,
}

impl CommissionPolicy {
    pub fn new(rate_bps: u32) -> Self {
        Self { rate_bps }
    }

    /// Fee rounded to the currency's scale.
    pub fn fee_for(&self, amount: Decimal, currency: Currency) -> Decimal {
        currency.round(amount * Decimal::from(self.rate_bps) / Decimal::from(10_000_u32))
    }
}

/// Charge parameters as the API layer hands them over.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub client_user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub booking_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub destination_user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub booking_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub booking_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Charge result: the recorded transaction plus whatever the customer needs
/// to complete payment.
#[derive(Debug, Clone)]
pub struct ChargeOutcome {
    pub transaction: Transaction,
    pub qr_string: Option<String>,
    pub payment_url: Option<String>,
}

/// Front door for money movement. Routes charges, payouts, refunds, and
/// internal transfers; records the Transaction before every provider call and
/// drives the ledger for outcomes the provider reports synchronously.
/// Webhook-driven outcomes belong to the webhook processor.
pub struct PaymentOrchestrator {
    transactions: Arc<dyn TransactionRepository>,
    ledger: Arc<LedgerService>,
    providers: Arc<ProviderRegistry>,
    users: Arc<dyn UserDirectory>,
    dispatcher: Arc<EventDispatcher>,
    routing: RoutingConfig,
    commission: Option<CommissionPolicy>,
    platform_user_id: String,
}

impl PaymentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        ledger: Arc<LedgerService>,
        providers: Arc<ProviderRegistry>,
        users: Arc<dyn UserDirectory>,
        dispatcher: Arc<EventDispatcher>,
        routing: RoutingConfig,
        commission: Option<CommissionPolicy>,
        platform_user_id: impl Into<String>,
    ) -> Self {
        Self {
            transactions,
            ledger,
            providers,
            users,
            dispatcher,
            routing,
            commission,
            platform_user_id: platform_user_id.into(),
        }
    }

    /// Charges a client through the provider routed for the payment method.
    /// QR charges come back `PENDING` with the QRIS string; card charges may
    /// settle or fail inside this call.
    pub async fn charge(&self, request: ChargeRequest) -> Result<ChargeOutcome> {
        let provider_name = self.charge_provider_name(request.method)?;
        let provider = self.providers.get(provider_name)?;
        ensure_supports(provider.as_ref(), request.method, request.currency)?;

        let mut transaction =
            Transaction::new(TransactionKind::Deposit, request.amount, request.currency)?
                .with_payment_method(request.method.to_string());
        if let Some(booking_id) = &request.booking_id {
            transaction = transaction.with_booking(booking_id.clone());
        }
        if let Some(metadata) = &request.metadata {
            transaction = transaction.with_metadata(metadata.clone());
        }

        let escrow = self
            .ledger
            .open_account(&self.platform_user_id, AccountKind::Escrow, request.currency)
            .await?;
        let wallet = self
            .ledger
            .open_account(&request.client_user_id, AccountKind::Wallet, request.currency)
            .await?;
        let transaction = transaction.with_accounts(Some(escrow.id), Some(wallet.id));

        let transaction = self.transactions.create(&transaction).await?;
        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %request.client_user_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            method = %request.method,
            provider = provider_name,
            "Charge initiated"
        );

        let outbound = ProviderChargeRequest {
            reference_id: transaction.id.clone(),
            amount: transaction.amount,
            currency: transaction.currency,
            method: request.method,
            description: request
                .description
                .clone()
                .unwrap_or_else(|| format!("Deposit {}", transaction.id)),
        };

        let (payment, provider) = match provider.charge(outbound.clone()).await {
            Ok(payment) => (payment, provider),
            Err(err) if err.is_provider_unavailable() => {
                let Some(fallback) =
                    self.charge_fallback(provider_name, request.method, request.currency)
                else {
                    return self.fail_charge(&transaction, err).await;
                };
                tracing::warn!(
                    transaction_id = %transaction.id,
                    primary = provider_name,
                    fallback = fallback.name(),
                    error = %err,
                    "Primary charge provider unavailable, rerouting once"
                );
                match fallback.charge(outbound).await {
                    Ok(payment) => (payment, fallback),
                    Err(fallback_err) => return self.fail_charge(&transaction, fallback_err).await,
                }
            }
            Err(err) => return self.fail_charge(&transaction, err).await,
        };

        let mut transaction = transaction
            .with_provider(provider.name())
            .with_external_id(payment.id.clone());
        if let Some(qr_string) = &payment.qr_string {
            merge_metadata(
                &mut transaction.metadata,
                "qr_string",
                serde_json::json!(qr_string),
            );
        }
        if let Some(payment_url) = &payment.payment_url {
            merge_metadata(
                &mut transaction.metadata,
                "payment_url",
                serde_json::json!(payment_url),
            );
        }
        transaction.updated_at = Utc::now();
        self.transactions.update(&transaction).await?;

        let transaction = match payment.status {
            ProviderPaymentStatus::Approved => {
                let drafts = transaction.settlement_drafts()?;
                let settled = self.ledger.settle(&transaction, &drafts, None).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PaymentApproved,
                            &settled.id,
                            settled.amount,
                            settled.currency,
                        )
                        .with_provider(provider.name()),
                    )
                    .await;
                settled
            }
            ProviderPaymentStatus::Rejected | ProviderPaymentStatus::Cancelled => {
                let code = payment
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "provider_rejected".to_string());
                let message = payment
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Charge rejected by {}", provider.name()));
                let failed = self.ledger.fail(&transaction, &code, &message, None).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PaymentFailed,
                            &failed.id,
                            failed.amount,
                            failed.currency,
                        )
                        .with_provider(provider.name())
                        .with_error(code, message),
                    )
                    .await;
                failed
            }
            ProviderPaymentStatus::Pending => transaction,
            ProviderPaymentStatus::Refunded => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    provider = provider.name(),
                    "Fresh charge reported refunded, leaving pending for webhook resolution"
                );
                transaction
            }
        };

        Ok(ChargeOutcome {
            transaction,
            qr_string: payment.qr_string,
            payment_url: payment.payment_url,
        })
    }

    /// Disburses wallet funds to the user's bank account. KYC and bank-account
    /// violations reject synchronously with no transaction record; the wallet
    /// hold lives for the life of the payout.
    pub async fn payout(&self, request: PayoutRequest) -> Result<Transaction> {
        let verification = self
            .users
            .verification_status(&request.destination_user_id)
            .await?;
        if !verification.is_approved() {
            return Err(AppError::validation(
                "kyc_not_approved",
                format!(
                    "User {} is not verified for payouts (status: {})",
                    request.destination_user_id, verification
                ),
            ));
        }
        let bank = self
            .users
            .bank_account(&request.destination_user_id)
            .await?
            .ok_or_else(|| {
                AppError::validation(
                    "bank_account_missing",
                    format!(
                        "User {} has no bank account on file",
                        request.destination_user_id
                    ),
                )
            })?;

        let provider = self.providers.get(&self.routing.payout_provider)?;
        ensure_supports(provider.as_ref(), PaymentMethod::BankTransfer, request.currency)?;

        let kind = if request.booking_id.is_some() {
            TransactionKind::BookingPayout
        } else {
            TransactionKind::Withdrawal
        };
        let mut transaction = Transaction::new(kind, request.amount, request.currency)?
            .with_provider(provider.name())
            .with_payment_method(PaymentMethod::BankTransfer.to_string());
        if let Some(booking_id) = &request.booking_id {
            transaction = transaction.with_booking(booking_id.clone());
        }
        if let Some(metadata) = &request.metadata {
            transaction = transaction.with_metadata(metadata.clone());
        }

        let wallet = self
            .ledger
            .open_account(
                &request.destination_user_id,
                AccountKind::Wallet,
                request.currency,
            )
            .await?;
        let escrow = self
            .ledger
            .open_account(&self.platform_user_id, AccountKind::Escrow, request.currency)
            .await?;
        let transaction = transaction.with_accounts(Some(wallet.id.clone()), Some(escrow.id));

        // The hold doubles as the available-balance check: insufficient funds
        // reject here, before any transaction row exists.
        self.ledger.place_hold(&wallet.id, transaction.amount).await?;

        let transaction = match self.transactions.create(&transaction).await {
            Ok(created) => created,
            Err(err) => {
                if let Err(release_err) = self
                    .ledger
                    .release_hold(&wallet.id, transaction.amount)
                    .await
                {
                    tracing::error!(
                        account_id = %wallet.id,
                        error = %release_err,
                        "Failed to release hold after payout create error"
                    );
                }
                return Err(err);
            }
        };

        tracing::info!(
            transaction_id = %transaction.id,
            user_id = %request.destination_user_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            kind = %transaction.kind,
            provider = %self.routing.payout_provider,
            "Payout initiated"
        );

        let outbound = ProviderPayoutRequest {
            reference_id: transaction.id.clone(),
            amount: transaction.amount,
            currency: transaction.currency,
            bank_code: bank.bank_code,
            account_number: bank.account_number,
            account_holder: bank.account_holder,
            description: request
                .description
                .clone()
                .unwrap_or_else(|| format!("Payout {}", transaction.id)),
        };

        let hold = HoldRelease {
            account_id: wallet.id.clone(),
            amount: transaction.amount,
        };

        // No fallback for payouts: a transport failure is a reportable failure.
        let payment = match provider.payout(outbound).await {
            Ok(payment) => payment,
            Err(err) => {
                let code = err.error_code().to_string();
                let message = err.to_string();
                let failed = self
                    .ledger
                    .fail(&transaction, &code, &message, Some(hold))
                    .await?;
                self.emit_payout_failed(&failed, &code, &message).await;
                return Err(err);
            }
        };

        let mut transaction = transaction.with_external_id(payment.id.clone());
        transaction.updated_at = Utc::now();
        self.transactions.update(&transaction).await?;

        match payment.status {
            ProviderPaymentStatus::Approved => {
                let drafts = transaction.settlement_drafts()?;
                let settled = self.ledger.settle(&transaction, &drafts, Some(hold)).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PayoutCompleted,
                            &settled.id,
                            settled.amount,
                            settled.currency,
                        )
                        .with_provider(provider.name()),
                    )
                    .await;
                Ok(settled)
            }
            ProviderPaymentStatus::Rejected | ProviderPaymentStatus::Cancelled => {
                let code = payment
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "provider_rejected".to_string());
                let message = payment
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Payout rejected by {}", provider.name()));
                let failed = self
                    .ledger
                    .fail(&transaction, &code, &message, Some(hold))
                    .await?;
                self.emit_payout_failed(&failed, &code, &message).await;
                Ok(failed)
            }
            ProviderPaymentStatus::Pending => Ok(transaction),
            ProviderPaymentStatus::Refunded => {
                tracing::warn!(
                    transaction_id = %transaction.id,
                    provider = provider.name(),
                    "Fresh payout reported refunded, leaving pending for webhook resolution"
                );
                Ok(transaction)
            }
        }
    }

    /// Refunds a settled deposit, fully or partially. At most one refund per
    /// deposit; a rejected or cancelled refund frees the slot for a retry.
    pub async fn refund(
        &self,
        transaction_id: &str,
        amount: Option<Decimal>,
    ) -> Result<Transaction> {
        let original = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Transaction {} not found", transaction_id))
            })?;
        if !original.can_refund() {
            return Err(AppError::validation(
                "not_refundable",
                format!(
                    "Transaction {} is a {} in status {}; only settled deposits are refundable",
                    original.id, original.kind, original.status
                ),
            ));
        }

        let refunds = self.transactions.find_refunds_of(&original.id).await?;
        let refund_in_flight = refunds.iter().any(|refund| {
            !matches!(
                refund.status,
                TransactionStatus::Failed | TransactionStatus::Cancelled
            )
        });
        if refund_in_flight {
            return Err(AppError::validation(
                "already_refunded",
                format!(
                    "Transaction {} already has a refund in flight or settled",
                    original.id
                ),
            ));
        }

        let amount = amount.unwrap_or(original.amount);
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_refund_amount",
                format!("Refund amount must be positive, got {}", amount),
            ));
        }
        original
            .currency
            .validate_amount(amount)
            .map_err(|e| AppError::validation("invalid_refund_amount", e))?;
        if amount > original.amount {
            return Err(AppError::validation(
                "refund_exceeds_original",
                format!(
                    "Refund of {} exceeds original charge of {}",
                    amount, original.amount
                ),
            ));
        }

        let provider_name = original.provider.clone().ok_or_else(|| {
            AppError::invariant(format!("Settled deposit {} has no provider", original.id))
        })?;
        let external_id = original.external_id.clone().ok_or_else(|| {
            AppError::invariant(format!("Settled deposit {} has no external id", original.id))
        })?;
        let provider = self.providers.get(&provider_name)?;

        // Money flows back: the deposit's destination wallet funds the refund.
        let mut refund = Transaction::new(TransactionKind::Refund, amount, original.currency)?
            .with_accounts(
                original.destination_account_id.clone(),
                original.source_account_id.clone(),
            )
            .with_parent(&original.id)
            .with_provider(&provider_name);
        if let Some(booking_id) = &original.booking_id {
            refund = refund.with_booking(booking_id.clone());
        }
        let refund = self.transactions.create(&refund).await?;

        tracing::info!(
            transaction_id = %refund.id,
            parent_transaction_id = %original.id,
            amount = %refund.amount,
            currency = %refund.currency,
            provider = %provider_name,
            "Refund initiated"
        );

        let payment = match provider.refund(&external_id, amount).await {
            Ok(payment) => payment,
            Err(err) => {
                let code = err.error_code().to_string();
                let message = err.to_string();
                let failed = self.ledger.fail(&refund, &code, &message, None).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PaymentFailed,
                            &failed.id,
                            failed.amount,
                            failed.currency,
                        )
                        .with_provider(provider_name.clone())
                        .with_error(code, message),
                    )
                    .await;
                return Err(err);
            }
        };

        let mut refund = refund.with_external_id(payment.id.clone());
        refund.updated_at = Utc::now();
        self.transactions.update(&refund).await?;

        match payment.status {
            ProviderPaymentStatus::Refunded | ProviderPaymentStatus::Approved => {
                let drafts = refund.settlement_drafts()?;
                let settled = self.ledger.settle(&refund, &drafts, None).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PaymentRefunded,
                            &settled.id,
                            settled.amount,
                            settled.currency,
                        )
                        .with_provider(provider_name),
                    )
                    .await;
                Ok(settled)
            }
            // QR refunds confirm via webhook against the refund's own id.
            ProviderPaymentStatus::Pending => Ok(refund),
            ProviderPaymentStatus::Rejected | ProviderPaymentStatus::Cancelled => {
                let code = payment
                    .error_code
                    .clone()
                    .unwrap_or_else(|| "provider_rejected".to_string());
                let message = payment
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("Refund rejected by {}", provider_name));
                let failed = self.ledger.fail(&refund, &code, &message, None).await?;
                self.dispatcher
                    .emit(
                        DomainEvent::for_transaction(
                            EventName::PaymentFailed,
                            &failed.id,
                            failed.amount,
                            failed.currency,
                        )
                        .with_provider(provider_name)
                        .with_error(code, message),
                    )
                    .await;
                Ok(failed)
            }
        }
    }

    /// Wallet-to-wallet movement, settled immediately with no provider. A
    /// booking id marks an escrow release, which carries the platform
    /// commission leg.
    pub async fn transfer(&self, request: TransferRequest) -> Result<Transaction> {
        let fee = match &request.booking_id {
            Some(_) => {
                let policy = self.commission.as_ref().ok_or_else(|| {
                    AppError::validation(
                        "commission_policy_missing",
                        "Escrow release requires a configured commission policy",
                    )
                })?;
                policy.fee_for(request.amount, request.currency)
            }
            None => Decimal::ZERO,
        };

        let from_wallet = self
            .ledger
            .open_account(&request.from_user_id, AccountKind::Wallet, request.currency)
            .await?;
        let to_wallet = self
            .ledger
            .open_account(&request.to_user_id, AccountKind::Wallet, request.currency)
            .await?;
        if !from_wallet.has_available(request.amount + fee) {
            return Err(AppError::validation(
                "insufficient_funds",
                format!(
                    "Account {} has {} available, cannot transfer {} plus fee {}",
                    from_wallet.id,
                    from_wallet.available_balance(),
                    request.amount,
                    fee
                ),
            ));
        }

        let mut transaction = Transaction::new(
            TransactionKind::InternalTransfer,
            request.amount,
            request.currency,
        )?
        .with_accounts(Some(from_wallet.id.clone()), Some(to_wallet.id));
        if let Some(booking_id) = &request.booking_id {
            transaction = transaction.with_booking(booking_id.clone());
        }
        if let Some(metadata) = &request.metadata {
            transaction = transaction.with_metadata(metadata.clone());
        }
        if fee > Decimal::ZERO {
            merge_metadata(
                &mut transaction.metadata,
                "commission_fee",
                serde_json::json!(fee.to_string()),
            );
        }
        let transaction = self.transactions.create(&transaction).await?;

        let mut drafts = transaction.settlement_drafts()?;
        if fee > Decimal::ZERO {
            let reserve = self
                .ledger
                .open_account(&self.platform_user_id, AccountKind::Reserve, request.currency)
                .await?;
            drafts.push(EntryDraft::debit(&from_wallet.id, fee));
            drafts.push(EntryDraft::credit(&reserve.id, fee));
        }

        let settled = self.ledger.settle(&transaction, &drafts, None).await?;
        tracing::info!(
            transaction_id = %settled.id,
            from_user_id = %request.from_user_id,
            to_user_id = %request.to_user_id,
            amount = %settled.amount,
            fee = %fee,
            currency = %settled.currency,
            "Internal transfer settled"
        );
        Ok(settled)
    }

    /// Stored view of a transaction and its ledger entries. Status moves only
    /// on provider confirmations, so there is no provider refresh here.
    pub async fn get_status(
        &self,
        transaction_id: &str,
    ) -> Result<(Transaction, Vec<LedgerEntry>)> {
        let transaction = self
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Transaction {} not found", transaction_id))
            })?;
        let entries = self.ledger.entries_for_transaction(&transaction.id).await?;
        Ok((transaction, entries))
    }

    fn charge_provider_name(&self, method: PaymentMethod) -> Result<&str> {
        match method {
            PaymentMethod::Card => Ok(self.routing.card_provider.as_str()),
            PaymentMethod::Dana | PaymentMethod::Ovo => Ok(self.routing.qr_provider.as_str()),
            PaymentMethod::BankTransfer => Err(AppError::validation(
                "unsupported_method",
                "bank_transfer is a payout rail, not a charge method",
            )),
        }
    }

    /// Fallback candidate for a charge that hit a transport-level failure.
    /// None when no fallback is configured, it matches the primary, or it
    /// cannot carry the method and currency.
    fn charge_fallback(
        &self,
        primary: &str,
        method: PaymentMethod,
        currency: Currency,
    ) -> Option<Arc<dyn PaymentProvider>> {
        let name = self.routing.charge_fallback.as_deref()?;
        if name == primary {
            return None;
        }
        let provider = self.providers.get(name).ok()?;
        if provider.supports_method(method) && provider.supports_currency(currency) {
            Some(provider)
        } else {
            None
        }
    }

    /// Terminal failure of a charge attempt before any money moved: records
    /// the failed row, emits `payment.failed`, and propagates the error.
    async fn fail_charge(&self, transaction: &Transaction, err: AppError) -> Result<ChargeOutcome> {
        let code = err.error_code().to_string();
        let message = err.to_string();
        let failed = self.ledger.fail(transaction, &code, &message, None).await?;
        self.dispatcher
            .emit(
                DomainEvent::for_transaction(
                    EventName::PaymentFailed,
                    &failed.id,
                    failed.amount,
                    failed.currency,
                )
                .with_error(code, message),
            )
            .await;
        Err(err)
    }

    async fn emit_payout_failed(&self, transaction: &Transaction, code: &str, message: &str) {
        let mut event = DomainEvent::for_transaction(
            EventName::PayoutFailed,
            &transaction.id,
            transaction.amount,
            transaction.currency,
        )
        .with_error(code, message);
        if let Some(provider) = &transaction.provider {
            event = event.with_provider(provider.clone());
        }
        self.dispatcher.emit(event).await;
    }
}

fn ensure_supports(
    provider: &dyn PaymentProvider,
    method: PaymentMethod,
    currency: Currency,
) -> Result<()> {
    if !provider.supports_method(method) {
        return Err(AppError::validation(
            "unsupported_method",
            format!("{} does not support {}", provider.name(), method),
        ));
    }
    if !provider.supports_currency(currency) {
        return Err(AppError::validation(
            "unsupported_currency",
            format!("{} does not accept {}", provider.name(), currency),
        ));
    }
    Ok(())
}

// Metadata may start life as JSON null; promote it to an object on first write.
fn merge_metadata(metadata: &mut serde_json::Value, key: &str, value: serde_json::Value) {
    if !metadata.is_object() {
        *metadata = serde_json::json!({});
    }
    if let Some(map) = metadata.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}
