use crate::core::{AppError, Result};
use crate::modules::payments::services::{WebhookOutcome, WebhookProcessor};
use crate::modules::providers::{KIRIMPAY, NUSAPAY, QRISPAY};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// POST /webhooks/nusapay — HMAC-signed, full snapshot
pub async fn nusapay_webhook(
    processor: web::Data<Arc<WebhookProcessor>>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    handle(&processor, NUSAPAY, "X-Nusapay-Signature", &req, &body).await
}

/// POST /webhooks/qrispay — callback-token, thin payload
pub async fn qrispay_webhook(
    processor: web::Data<Arc<WebhookProcessor>>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    handle(&processor, QRISPAY, "X-Callback-Token", &req, &body).await
}

/// POST /webhooks/kirimpay — API-key, thin payload
pub async fn kirimpay_webhook(
    processor: web::Data<Arc<WebhookProcessor>>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    handle(&processor, KIRIMPAY, "X-Api-Key", &req, &body).await
}

/// Shared ingress path. Authentication and concurrency errors keep their
/// status codes (401, 503); every other processing failure is flattened to a
/// 500 so the provider redelivers against the reclaimable claim.
async fn handle(
    processor: &WebhookProcessor,
    provider: &str,
    signature_header: &str,
    req: &HttpRequest,
    body: &[u8],
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get(signature_header)
        .and_then(|value| value.to_str().ok());

    match processor.process(provider, body, signature).await {
        Ok(WebhookOutcome::Processed(summary)) => Ok(HttpResponse::Ok().json(json!({
            "status": "processed",
            "result": summary,
        }))),
        Ok(WebhookOutcome::Duplicate) => Ok(HttpResponse::Ok().json(json!({
            "status": "duplicate",
        }))),
        Ok(WebhookOutcome::Ignored(reason)) => Ok(HttpResponse::Ok().json(json!({
            "status": "ignored",
            "reason": reason,
        }))),
        Err(err @ (AppError::Authentication(_) | AppError::Concurrent(_))) => Err(err),
        Err(err) => {
            tracing::error!(
                provider = provider,
                error = %err,
                error_code = err.error_code(),
                "Webhook processing failed"
            );
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": {
                    "code": err.error_code(),
                    "message": err.to_string(),
                }
            })))
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/webhooks")
            .route("/nusapay", web::post().to(nusapay_webhook))
            .route("/qrispay", web::post().to(qrispay_webhook))
            .route("/kirimpay", web::post().to(kirimpay_webhook)),
    );
}
