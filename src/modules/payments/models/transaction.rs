use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::EntryDraft;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of money movement a transaction represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Client tops up a wallet through a provider charge
    Deposit,
    /// Worker withdraws wallet funds through a bank disbursement
    Withdrawal,
    /// Disbursement for a completed booking
    BookingPayout,
    /// Money returned to a client for a settled deposit
    Refund,
    /// Wallet-to-wallet movement (escrow release, corrections)
    InternalTransfer,
    /// Operator-supplied balanced correction
    Adjustment,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Deposit => write!(f, "deposit"),
            TransactionKind::Withdrawal => write!(f, "withdrawal"),
            TransactionKind::BookingPayout => write!(f, "booking_payout"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::InternalTransfer => write!(f, "internal_transfer"),
            TransactionKind::Adjustment => write!(f, "adjustment"),
        }
    }
}

/// Transaction lifecycle status. Terminal statuses are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR(20)", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Settled,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Settled | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }

    /// Allowed transitions:
    /// PENDING -> PROCESSING | SETTLED | FAILED | CANCELLED
    /// PROCESSING -> SETTLED | FAILED | CANCELLED
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::Pending => next != TransactionStatus::Pending,
            TransactionStatus::Processing => {
                matches!(
                    next,
                    TransactionStatus::Settled
                        | TransactionStatus::Failed
                        | TransactionStatus::Cancelled
                )
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Processing => write!(f, "processing"),
            TransactionStatus::Settled => write!(f, "settled"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "settled" => Ok(TransactionStatus::Settled),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// A financial event. Status moves only on provider confirmations, and the
/// settlement write shares its atomic unit with the ledger entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    /// Unique transaction ID (UUID)
    pub id: String,

    pub kind: TransactionKind,

    pub status: TransactionStatus,

    /// Gross amount, always positive
    pub amount: Decimal,

    pub currency: Currency,

    /// Account money leaves (wallet for payouts/refunds/transfers)
    pub source_account_id: Option<String>,

    /// Account money enters (wallet for deposits/transfers)
    pub destination_account_id: Option<String>,

    /// Provider's payment/disbursement ID, unique when present
    pub external_id: Option<String>,

    /// Provider that carries this transaction (none for internal movements)
    pub provider: Option<String>,

    /// Payment method used at charge time (card, dana, ovo, bank_transfer)
    pub payment_method: Option<String>,

    /// Original transaction for refunds
    pub parent_transaction_id: Option<String>,

    /// Marketplace booking this movement belongs to
    pub booking_id: Option<String>,

    /// Terminal failure details, provider-normalized
    pub error_code: Option<String>,
    pub error_message: Option<String>,

    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(kind: TransactionKind, amount: Decimal, currency: Currency) -> Result<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "invalid_amount",
                format!("Transaction amount must be positive, got {}", amount),
            ));
        }

        currency
            .validate_amount(amount)
            .map_err(|e| AppError::validation("invalid_amount", e))?;

        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: TransactionStatus::Pending,
            amount,
            currency,
            source_account_id: None,
            destination_account_id: None,
            external_id: None,
            provider: None,
            payment_method: None,
            parent_transaction_id: None,
            booking_id: None,
            error_code: None,
            error_message: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            settled_at: None,
        })
    }

    pub fn with_accounts(
        mut self,
        source_account_id: Option<String>,
        destination_account_id: Option<String>,
    ) -> Self {
        self.source_account_id = source_account_id;
        self.destination_account_id = destination_account_id;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_payment_method(mut self, method: impl Into<String>) -> Self {
        self.payment_method = Some(method.into());
        self
    }

    pub fn with_parent(mut self, parent_transaction_id: impl Into<String>) -> Self {
        self.parent_transaction_id = Some(parent_transaction_id.into());
        self
    }

    pub fn with_booking(mut self, booking_id: impl Into<String>) -> Self {
        self.booking_id = Some(booking_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the transaction along the lifecycle, rejecting terminal
    /// mutations and skipped states.
    pub fn transition(&mut self, next: TransactionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::invariant(format!(
                "Invalid transaction transition {} -> {} for {}",
                self.status, next, self.id
            )));
        }

        self.status = next;
        self.updated_at = Utc::now();
        if next == TransactionStatus::Settled {
            self.settled_at = Some(self.updated_at);
        }
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Result<()> {
        self.transition(TransactionStatus::Failed)?;
        self.error_code = Some(error_code.into());
        self.error_message = Some(error_message.into());
        Ok(())
    }

    pub fn can_refund(&self) -> bool {
        self.kind == TransactionKind::Deposit && self.status == TransactionStatus::Settled
    }

    /// The balanced entry pair that settles this transaction: a debit against
    /// the source account and a credit into the destination account. Account
    /// polarity makes the same shape correct for every kind.
    pub fn settlement_drafts(&self) -> Result<Vec<EntryDraft>> {
        let source = self.source_account_id.as_deref().ok_or_else(|| {
            AppError::invariant(format!("Transaction {} has no source account", self.id))
        })?;
        let destination = self.destination_account_id.as_deref().ok_or_else(|| {
            AppError::invariant(format!("Transaction {} has no destination account", self.id))
        })?;

        Ok(vec![
            EntryDraft::debit(source, self.amount),
            EntryDraft::credit(destination, self.amount),
        ])
    }
}
