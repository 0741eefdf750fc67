//! Scripted provider double. Outbound calls (charge/payout/refund) pop
//! pre-loaded results; webhook ground truth lives in the `statuses` map,
//! served either through the decoded snapshot (trusted) or `get_status`
//! (untrusted fetch-back).

use rust_decimal::Decimal;
use saldo::core::{AppError, Currency, Result};
use saldo::modules::providers::{
    PaymentMethod, PaymentProvider, ProviderChargeRequest, ProviderPayment,
    ProviderPaymentStatus, ProviderPayoutRequest, WebhookEvent, WebhookKind,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// The one signature every sandbox provider accepts.
pub const SIGNATURE: &str = "sandbox-signature";

pub struct SandboxProvider {
    name: &'static str,
    methods: Vec<PaymentMethod>,
    trusted: bool,
    charges: Mutex<VecDeque<Result<ProviderPayment>>>,
    payouts: Mutex<VecDeque<Result<ProviderPayment>>>,
    refunds: Mutex<VecDeque<Result<ProviderPayment>>>,
    statuses: Mutex<HashMap<String, ProviderPayment>>,
    status_fetches: Mutex<usize>,
}

impl SandboxProvider {
    pub fn trusted(name: &'static str, methods: Vec<PaymentMethod>) -> Self {
        Self {
            name,
            methods,
            trusted: true,
            charges: Mutex::new(VecDeque::new()),
            payouts: Mutex::new(VecDeque::new()),
            refunds: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(HashMap::new()),
            status_fetches: Mutex::new(0),
        }
    }

    pub fn untrusted(name: &'static str, methods: Vec<PaymentMethod>) -> Self {
        Self {
            trusted: false,
            ..Self::trusted(name, methods)
        }
    }

    pub fn push_charge(&self, result: Result<ProviderPayment>) {
        self.charges.lock().unwrap().push_back(result);
    }

    pub fn push_payout(&self, result: Result<ProviderPayment>) {
        self.payouts.lock().unwrap().push_back(result);
    }

    pub fn push_refund(&self, result: Result<ProviderPayment>) {
        self.refunds.lock().unwrap().push_back(result);
    }

    /// Sets what the provider currently believes about a payment. Webhook
    /// deliveries resolve against this map.
    pub fn set_status(&self, payment: ProviderPayment) {
        self.statuses
            .lock()
            .unwrap()
            .insert(payment.id.clone(), payment);
    }

    /// How many times the processor fetched ground truth over the wire.
    pub fn status_fetches(&self) -> usize {
        *self.status_fetches.lock().unwrap()
    }
}

#[async_trait]
impl PaymentProvider for SandboxProvider {
    async fn charge(&self, _request: ProviderChargeRequest) -> Result<ProviderPayment> {
        self.charges
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::internal("no scripted charge")))
    }

    async fn payout(&self, _request: ProviderPayoutRequest) -> Result<ProviderPayment> {
        self.payouts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::internal("no scripted payout")))
    }

    async fn refund(&self, _payment_id: &str, _amount: Decimal) -> Result<ProviderPayment> {
        self.refunds
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::internal("no scripted refund")))
    }

    async fn get_status(&self, payment_id: &str) -> Result<ProviderPayment> {
        *self.status_fetches.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("Payment {} not found", payment_id)))
    }

    fn verify_signature(&self, _payload: &[u8], signature: &str) -> bool {
        signature == SIGNATURE
    }

    fn decode_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let body: serde_json::Value = serde_json::from_slice(payload)?;
        let event_id = body["event_id"]
            .as_str()
            .ok_or_else(|| AppError::validation("malformed", "Missing event_id"))?
            .to_string();
        let payment_id = body["payment_id"].as_str().unwrap_or_default().to_string();
        let snapshot = if self.trusted {
            self.statuses.lock().unwrap().get(&payment_id).cloned()
        } else {
            None
        };
        let kind = match body["type"].as_str().unwrap_or_default() {
            "payment" => WebhookKind::PaymentUpdated {
                payment_id,
                snapshot,
            },
            "payout" => WebhookKind::PayoutUpdated {
                payout_id: payment_id,
                snapshot,
            },
            other => WebhookKind::Ignored {
                event_type: other.to_string(),
            },
        };
        Ok(WebhookEvent {
            provider: self.name.to_string(),
            event_id,
            kind,
        })
    }

    fn name(&self) -> &str {
        self.name
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        self.methods.contains(&method)
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        currency == Currency::IDR
    }

    fn trusts_webhook_payload(&self) -> bool {
        self.trusted
    }
}

pub fn payment_body(event_id: &str, payment_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event_id": event_id,
        "type": "payment",
        "payment_id": payment_id,
    }))
    .unwrap()
}

pub fn payout_body(event_id: &str, payout_id: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event_id": event_id,
        "type": "payout",
        "payment_id": payout_id,
    }))
    .unwrap()
}

pub fn sandbox_payment(id: &str, amount: Decimal, status: ProviderPaymentStatus) -> ProviderPayment {
    ProviderPayment::new(id, amount, Currency::IDR, status)
}

pub fn rejected(id: &str, amount: Decimal, code: &str, message: &str) -> ProviderPayment {
    sandbox_payment(id, amount, ProviderPaymentStatus::Rejected).with_error(code, message)
}
