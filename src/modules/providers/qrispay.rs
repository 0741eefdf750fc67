use super::http::{status_error, transport_error};
use super::provider_trait::{
    PaymentMethod, PaymentProvider, ProviderChargeRequest, ProviderPayment,
    ProviderPaymentStatus, WebhookEvent, WebhookKind,
};
use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const QRISPAY: &str = "qrispay";

/// QrisPay QRIS e-wallet aggregator client (DANA and OVO).
///
/// Charges return a scannable QRIS string and settle later via webhook.
/// Webhooks are authenticated by callback-token equality (`X-Callback-Token`)
/// and intentionally carry no amounts; financial truth requires a fetch-back
/// through `get_status`.
pub struct QrispayProvider {
    client: ClientWithMiddleware,
    api_key: String,
    callback_token: String,
    base_url: String,
}

impl QrispayProvider {
    pub fn new(
        client: ClientWithMiddleware,
        api_key: String,
        callback_token: String,
        base_url: String,
    ) -> Self {
        Self {
            client,
            api_key,
            callback_token,
            base_url,
        }
    }

    fn wallet_code(method: PaymentMethod) -> Result<&'static str> {
        match method {
            PaymentMethod::Dana => Ok("dana"),
            PaymentMethod::Ovo => Ok("ovo"),
            other => Err(AppError::validation(
                "unsupported_method",
                format!("QrisPay does not support {}", other),
            )),
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
                tracing::warn!(provider = QRISPAY, status = other, "Unknown charge status");
                ProviderPaymentStatus::Pending
            }
        }
    }

    fn normalize(charge: QrispayCharge) -> Result<ProviderPayment> {
        let amount = Decimal::from_str(&charge.amount).map_err(|e| {
            AppError::validation("invalid_amount", format!("QrisPay amount: {}", e))
        })?;
        let currency = Currency::from_str(&charge.currency)
            .map_err(|e| AppError::validation("invalid_currency", e))?;

        let mut payment =
            ProviderPayment::new(charge.id, amount, currency, Self::map_status(&charge.status));
        if let (Some(code), Some(message)) = (charge.error_code, charge.error_message) {
            payment = payment.with_error(code, message);
        }
        if let Some(qr_string) = charge.qr_string {
            payment = payment.with_qr_string(qr_string);
        }
        Ok(payment)
    }
}

#[async_trait]
impl PaymentProvider for QrispayProvider {
    async fn charge(&self, request: ProviderChargeRequest) -> Result<ProviderPayment> {
        let url = format!("{}/v1/charges", self.base_url);
        let body = QrispayChargeRequest {
            reference_id: request.reference_id,
            amount: request.amount.to_string(),
            currency: request.currency.to_string(),
            wallet: Self::wallet_code(request.method)?.to_string(),
            description: request.description,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(""))
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(QRISPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(QRISPAY, status, &body));
        }

        let charge: QrispayCharge = response.json().await?;
        Self::normalize(charge)
    }

    async fn refund(&self, payment_id: &str, amount: Decimal) -> Result<ProviderPayment> {
        let url = format!("{}/v1/charges/{}/refund", self.base_url, payment_id);
        let body = QrispayRefundRequest {
            amount: amount.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(""))
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(QRISPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(QRISPAY, status, &body));
        }

        let charge: QrispayCharge = response.json().await?;
        Self::normalize(charge)
    }

    async fn get_status(&self, payment_id: &str) -> Result<ProviderPayment> {
        let url = format!("{}/v1/charges/{}", self.base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.api_key, Some(""))
            .send()
            .await
            .map_err(|e| transport_error(QRISPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(QRISPAY, status, &body));
        }

        let charge: QrispayCharge = response.json().await?;
        Self::normalize(charge)
    }

    fn verify_signature(&self, _payload: &[u8], signature: &str) -> bool {
        // Token equality per the QrisPay callback contract
        signature == self.callback_token
    }

    fn decode_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let webhook: QrispayWebhook = serde_json::from_slice(payload)?;

        let kind = match webhook.event.as_str() {
            "charge.updated" => {
                let charge_id = webhook.charge_id.ok_or_else(|| {
                    AppError::validation(
                        "malformed_webhook",
                        "QrisPay charge.updated without a charge_id",
                    )
                })?;
                // No snapshot on purpose: the thin payload carries no amounts
                WebhookKind::PaymentUpdated {
                    payment_id: charge_id,
                    snapshot: None,
                }
            }
            other => WebhookKind::Ignored {
                event_type: other.to_string(),
            },
        };

        Ok(WebhookEvent {
            provider: QRISPAY.to_string(),
            event_id: webhook.event_id,
            kind,
        })
    }

    fn name(&self) -> &str {
        QRISPAY
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        method.is_qr_wallet()
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        // QRIS is an IDR-only rail
        matches!(currency, Currency::IDR)
    }

    fn trusts_webhook_payload(&self) -> bool {
        false
    }
}

// QrisPay API structures

#[derive(Debug, Serialize)]
struct QrispayChargeRequest {
    reference_id: String,
    amount: String,
    currency: String,
    wallet: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct QrispayRefundRequest {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct QrispayCharge {
    id: String,
    status: String,
    amount: String,
    currency: String,
    qr_string: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QrispayWebhook {
    event_id: String,
    event: String,
    charge_id: Option<String>,
}
