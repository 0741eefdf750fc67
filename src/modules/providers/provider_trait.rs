use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment instrument chosen by the caller; routing keys on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Dana,
    Ovo,
    BankTransfer,
}

impl PaymentMethod {
    pub fn is_qr_wallet(&self) -> bool {
        matches!(self, PaymentMethod::Dana | PaymentMethod::Ovo)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "card"),
            PaymentMethod::Dana => write!(f, "dana"),
            PaymentMethod::Ovo => write!(f, "ovo"),
            PaymentMethod::BankTransfer => write!(f, "bank_transfer"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "dana" => Ok(PaymentMethod::Dana),
            "ovo" => Ok(PaymentMethod::Ovo),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            _ => Err(format!("Invalid payment method: {}", s)),
        }
    }
}

/// Provider-side payment state after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderPaymentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
}

impl std::fmt::Display for ProviderPaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderPaymentStatus::Pending => write!(f, "pending"),
            ProviderPaymentStatus::Approved => write!(f, "approved"),
            ProviderPaymentStatus::Rejected => write!(f, "rejected"),
            ProviderPaymentStatus::Cancelled => write!(f, "cancelled"),
            ProviderPaymentStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Normalized provider response. No caller above the adapter layer ever sees
/// a provider-specific shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayment {
    pub success: bool,
    /// Provider-assigned payment/payout id
    pub id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: ProviderPaymentStatus,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// QRIS payload for the customer to scan (QR charges only)
    pub qr_string: Option<String>,
    /// Hosted payment page (card charges only)
    pub payment_url: Option<String>,
}

impl ProviderPayment {
    pub fn new(
        id: impl Into<String>,
        amount: Decimal,
        currency: Currency,
        status: ProviderPaymentStatus,
    ) -> Self {
        Self {
            success: !matches!(
                status,
                ProviderPaymentStatus::Rejected | ProviderPaymentStatus::Cancelled
            ),
            id: id.into(),
            amount,
            currency,
            status,
            error_code: None,
            error_message: None,
            qr_string: None,
            payment_url: None,
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_qr_string(mut self, qr_string: impl Into<String>) -> Self {
        self.qr_string = Some(qr_string.into());
        self
    }

    pub fn with_payment_url(mut self, payment_url: impl Into<String>) -> Self {
        self.payment_url = Some(payment_url.into());
        self
    }
}

/// Charge request as the adapter sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderChargeRequest {
    /// Our transaction id, handed to the provider as its external reference
    pub reference_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub description: String,
}

/// Payout (disbursement) request as the adapter sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPayoutRequest {
    pub reference_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub bank_code: String,
    pub account_number: String,
    pub account_holder: String,
    pub description: String,
}

/// What a webhook body says happened, decoded at the boundary.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub provider: String,
    /// Provider-assigned delivery id; the idempotency key
    pub event_id: String,
    pub kind: WebhookKind,
}

#[derive(Debug, Clone)]
pub enum WebhookKind {
    PaymentUpdated {
        payment_id: String,
        /// Present only when the provider's signed payload is trusted
        snapshot: Option<ProviderPayment>,
    },
    PayoutUpdated {
        payout_id: String,
        snapshot: Option<ProviderPayment>,
    },
    /// Authentic but irrelevant event type; acknowledged without processing
    Ignored { event_type: String },
}

/// One external payment provider. Adapters translate between the provider's
/// REST API and the normalized types above; unsupported operations keep the
/// default rejection.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a charge. May settle synchronously (card) or return a pending
    /// payment carrying a QR string (wallets).
    async fn charge(&self, request: ProviderChargeRequest) -> Result<ProviderPayment> {
        let _ = request;
        Err(AppError::validation(
            "unsupported_operation",
            format!("{} does not support charges", self.name()),
        ))
    }

    /// Creates a bank disbursement.
    async fn payout(&self, request: ProviderPayoutRequest) -> Result<ProviderPayment> {
        let _ = request;
        Err(AppError::validation(
            "unsupported_operation",
            format!("{} does not support payouts", self.name()),
        ))
    }

    /// Refunds a settled charge, fully or partially.
    async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<ProviderPayment> {
        let _ = (payment_id, amount);
        Err(AppError::validation(
            "unsupported_operation",
            format!("{} does not support refunds", self.name()),
        ))
    }

    /// Authenticated status fetch; ground truth for untrusted webhooks.
    async fn get_status(&self, payment_id: &str) -> Result<ProviderPayment>;

    /// Pure check of the signature header against the raw body.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    /// Decodes a raw webhook body. Errors mean a malformed body, which the
    /// ingress acknowledges without processing.
    fn decode_webhook(&self, payload: &[u8]) -> Result<WebhookEvent>;

    fn name(&self) -> &str;

    fn supports_method(&self, method: PaymentMethod) -> bool;

    fn supports_currency(&self, currency: Currency) -> bool;

    /// Whether the signed webhook body carries trustworthy financial detail.
    /// When false the processor must fetch ground truth via `get_status`.
    fn trusts_webhook_payload(&self) -> bool;
}
