use super::http::{status_error, transport_error};
use super::provider_trait::{
    PaymentMethod, PaymentProvider, ProviderPayment, ProviderPaymentStatus,
    ProviderPayoutRequest, WebhookEvent, WebhookKind,
};
use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const KIRIMPAY: &str = "kirimpay";

/// KirimPay bank-transfer disbursement client, used for worker payouts.
///
/// Webhooks are authenticated by API-key equality (`X-Api-Key`) and carry
/// only the disbursement id; status truth comes from `get_status`.
pub struct KirimpayProvider {
    client: ClientWithMiddleware,
    api_key: String,
    webhook_key: String,
    base_url: String,
}

impl KirimpayProvider {
    pub fn new(
        client: ClientWithMiddleware,
        api_key: String,
        webhook_key: String,
        base_url: String,
    ) -> Self {
        Self {
            client,
            api_key,
            webhook_key,
            base_url,
        }
    }

    fn map_status(status: &str) -> ProviderPaymentStatus {
        match status {
            "completed" => ProviderPaymentStatus::Approved,
            "failed" => ProviderPaymentStatus::Rejected,
            "cancelled" => ProviderPaymentStatus::Cancelled,
            "pending" => ProviderPaymentStatus::Pending,
            other => {
                tracing::warn!(provider = KIRIMPAY, status = other, "Unknown disbursement status");
                ProviderPaymentStatus::Pending
            }
        }
    }

    fn normalize(disbursement: KirimpayDisbursement) -> Result<ProviderPayment> {
        let amount = Decimal::from_str(&disbursement.amount).map_err(|e| {
            AppError::validation("invalid_amount", format!("KirimPay amount: {}", e))
        })?;
        let currency = Currency::from_str(&disbursement.currency)
            .map_err(|e| AppError::validation("invalid_currency", e))?;

        let mut payment = ProviderPayment::new(
            disbursement.id,
            amount,
            currency,
            Self::map_status(&disbursement.status),
        );
        if let (Some(code), Some(message)) =
            (disbursement.failure_code, disbursement.failure_message)
        {
            payment = payment.with_error(code, message);
        }
        Ok(payment)
    }
}

#[async_trait]
impl PaymentProvider for KirimpayProvider {
    async fn payout(&self, request: ProviderPayoutRequest) -> Result<ProviderPayment> {
        let url = format!("{}/v1/disbursements", self.base_url);
        let body = KirimpayDisbursementRequest {
            reference_id: request.reference_id,
            amount: request.amount.to_string(),
            currency: request.currency.to_string(),
            bank_code: request.bank_code,
            account_number: request.account_number,
            account_holder: request.account_holder,
            description: request.description,
        };

        let response = self
            .client
            .post(&url)
            .header("X-Api-Key", &self.api_key)
            .header("X-Idempotency-Key", Uuid::new_v4().to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(KIRIMPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(KIRIMPAY, status, &body));
        }

        let disbursement: KirimpayDisbursement = response.json().await?;
        Self::normalize(disbursement)
    }

    async fn get_status(&self, payment_id: &str) -> Result<ProviderPayment> {
        let url = format!("{}/v1/disbursements/{}", self.base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(KIRIMPAY, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(KIRIMPAY, status, &body));
        }

        let disbursement: KirimpayDisbursement = response.json().await?;
        Self::normalize(disbursement)
    }

    fn verify_signature(&self, _payload: &[u8], signature: &str) -> bool {
        signature == self.webhook_key
    }

    fn decode_webhook(&self, payload: &[u8]) -> Result<WebhookEvent> {
        let webhook: KirimpayWebhook = serde_json::from_slice(payload)?;

        let kind = match webhook.event.as_str() {
            "disbursement.updated" => {
                let disbursement_id = webhook.disbursement_id.ok_or_else(|| {
                    AppError::validation(
                        "malformed_webhook",
                        "KirimPay disbursement.updated without a disbursement_id",
                    )
                })?;
                WebhookKind::PayoutUpdated {
                    payout_id: disbursement_id,
                    snapshot: None,
                }
            }
            other => WebhookKind::Ignored {
                event_type: other.to_string(),
            },
        };

        Ok(WebhookEvent {
            provider: KIRIMPAY.to_string(),
            event_id: webhook.event_id,
            kind,
        })
    }

    fn name(&self) -> &str {
        KIRIMPAY
    }

    fn supports_method(&self, method: PaymentMethod) -> bool {
        matches!(method, PaymentMethod::BankTransfer)
    }

    fn supports_currency(&self, currency: Currency) -> bool {
        matches!(currency, Currency::IDR)
    }

    fn trusts_webhook_payload(&self) -> bool {
        false
    }
}

// KirimPay API structures

#[derive(Debug, Serialize)]
struct KirimpayDisbursementRequest {
    reference_id: String,
    amount: String,
    currency: String,
    bank_code: String,
    account_number: String,
    account_holder: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct KirimpayDisbursement {
    id: String,
    status: String,
    amount: String,
    currency: String,
    failure_code: Option<String>,
    failure_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KirimpayWebhook {
    event_id: String,
    event: String,
    disbursement_id: Option<String>,
}
