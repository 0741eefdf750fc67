use super::http::{status_error, transport_error};
use super::provider_trait::{
    PaymentMethod, PaymentProvider, ProviderChargeRequest, ProviderPayment,
    ProviderPaymentStatus, WebhookEvent, WebhookKind,
};
use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::str::FromStr;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const NUSAPAY: &str = "nusapay";

/// NusaPay card acquirer client.
///
/// Webhooks are signed with HMAC-SHA256 over the raw body
/// (`X-Nusapay-Signature`, hex) and carry a full charge snapshot, so a
/// verified payload is ground truth. Card charges may settle synchronously
/// inside the charge call.
pub struct NusapayProvider {
    client: ClientWithMiddleware,
    api_key: String,
    webhook_secret: String,
    base_url: String,
}

impl NusapayProvider {
    pub fn new(
        client: ClientWithMiddleware,
        api_key: String,
        webhook_secret: String,
        base_url: String,
    ) -> Self {
        Self {
            client,
            api_key,
            webhook_secret,
            base_url,
        }
    }

    fn map_status(status: &str) -> ProviderPaymentStatus {
        match status {
            "approved" => ProviderPaymentStatus::Approved,
            "rejected" => ProviderPaymentStatus::Rejected,
            "cancelled" => ProviderPaymentStatus::Cancelled,
            "refunded" => ProviderPaymentStatus::Refunded,
            "pending" => ProviderPaymentStatus::Pending,
            other => {
                tracing::warn!(provider = NUSAPAY, status = other, "Unknown charge status");
                ProviderPaymentStatus::Pending
            }
        }
    }

    fn normalize(charge: NusapayCharge) -> Result<ProviderPayment> {
        let amount = Decimal::from_str(&charge.amount).map_err(|e| {
            AppError::validation("invalid_amount", format!("NusaPay amount: {}", e))
        })?;
        let currency = Currency::from_str(&charge.currency)
            .map_err(|e| AppError::validation("invalid_currency", e))?;

        let mut payment =
            ProviderPayment::new(charge.id, amount, currency, Self::map_status(&charge.status));
        if let (Some(code), Some(message)) = (charge.error_code, charge.error_message) {
            payment = payment.with_error(code, message);
        }
        if let Some(url) = charge.payment_url {
            payment = payment.with_payment_url(url);
        }
        Ok(payment)
    }

    async fn fetch_charge(&self, url: String) -> Result<ProviderPayment> {
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(NUSAPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(NUSAPAY, status, &body));
        }

        let charge: NusapayCharge = response.json().await?;
        Self::normalize(charge)
    }
}

#[async_trait]
impl PaymentProvider for NusapayProvider {
    async fn charge(&self, request: ProviderChargeRequest) -> Result<ProviderPayment> {
        let url = format!("{}/v1/charges", self.base_url);
        let body = NusapayChargeRequest {
            reference_id: request.reference_id,
            amount: request.amount.to_string(),
            currency: request.currency.to_string(),
            channel: "card".to_string(),
            description: request.description,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(NUSAPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(NUSAPAY, status, &body));
        }

        let charge: NusapayCharge = response.json().await?;
        Self::normalize(charge)
    }

    async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<ProviderPayment> {
        let url = format!("{}/v1/charges/{}/refund", self.base_url, payment_id);
        let body = NusapayRefundRequest {
            amount: amount.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(NUSAPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(NUSAPAY, status, &body));
        }

        let charge: NusapayCharge = response.json().await?;
        Self::normalize(charge)
    }

    async fn get_status(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.fetch_charge(format!("{}/v1/charges/{}", self.base_url, payment_id))
            .await
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        let expected = match hex::decode(signature.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = match HmacSha256::new_from_slice(self.webhook_secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(payload);

        // Constant-time comparison
        mac.verify_slice(&expected).is_ok()
    }

    fn decode_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let webhook: NusapayWebhook = serde_json::from_slice(payload)?;

        let kind = match webhook.event_type.as_str() {
            "charge.updated" => {
                let charge = webhook.charge.ok_or_else(|| {
                    AppError::validation(
                        "malformed_webhook",
                        "NusaPay charge.updated without a charge body",
                    )
                })?;
                WebhookKind::PaymentUpdated {
                    payment_id: charge.id.clone(),
                    snapshot: Some(Self::normalize(charge)?),
                }
            }
            other => WebhookKind::Ignored {
                event_type: other.to_string(),
            },
        };

        Ok(WebhookEvent {
            provider: NUSAPAY.to_string(),
            event_id: webhook.event_id,
            kind,
        })
    }

    fn name(&self) -> &str {
        NUSAPAY
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        matches!(method, PaymentMethod::Card)
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::IDR)
    }

    fn trusts_webhook_payload(&self) -> bool {
        true
    }
}

// NusaPay API structures

#[derive(Debug, Serialize)]
struct NusapayChargeRequest {
    reference_id: String,
    amount: String,
    currency: String,
    channel: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct NusapayRefundRequest {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct NusapayCharge {
    id: String,
    status: String,
    amount: String,
    currency: String,
    error_code: Option<String>,
    error_message: Option<String>,
    payment_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NusapayWebhook {
    event_id: String,
    event_type: String,
    charge: Option<NusapayCharge>,
}
