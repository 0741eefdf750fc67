use crate::core::{Currency, Result};
use crate::modules::ledger::LedgerEntry;
use crate::modules::payments::models::Transaction;
use crate::modules::payments::services::{
    ChargeRequest, PaymentOrchestrator, PayoutRequest, TransferRequest,
};
use crate::modules::providers::PaymentMethod;
use actix_web::{web, HttpResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// POST /api/payments
pub async fn create_payment(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    body: web::Json<CreatePaymentRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let outcome = orchestrator
        .charge(ChargeRequest {
            client_user_id: request.user_id,
            amount: request.amount,
            currency: request.currency,
            method: request.method,
            booking_id: request.booking_id,
            description: request.description,
            metadata: request.metadata,
        })
        .await?;

    Ok(HttpResponse::Created().json(PaymentResponse {
        transaction: outcome.transaction,
        qr_string: outcome.qr_string,
        payment_url: outcome.payment_url,
    }))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let (transaction, entries) = orchestrator.get_status(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(PaymentStatusResponse {
        transaction,
        entries,
    }))
}

/// POST /api/payments/{id}/refund
pub async fn refund_payment(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    path: web::Path<String>,
    body: web::Json<RefundRequest>,
) -> Result<HttpResponse> {
    let refund = orchestrator
        .refund(&path.into_inner(), body.into_inner().amount)
        .await?;
    Ok(HttpResponse::Created().json(refund))
}

/// POST /api/payouts
pub async fn create_payout(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    body: web::Json<CreatePayoutRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let payout = orchestrator
        .payout(PayoutRequest {
            destination_user_id: request.user_id,
            amount: request.amount,
            currency: request.currency,
            booking_id: request.booking_id,
            description: request.description,
            metadata: request.metadata,
        })
        .await?;
    Ok(HttpResponse::Created().json(payout))
}

/// POST /api/transfers
pub async fn create_transfer(
    orchestrator: web::Data<Arc<PaymentOrchestrator>>,
    body: web::Json<CreateTransferRequest>,
) -> Result<HttpResponse> {
    let request = body.into_inner();
    let transfer = orchestrator
        .transfer(TransferRequest {
            from_user_id: request.from_user_id,
            to_user_id: request.to_user_id,
            amount: request.amount,
            currency: request.currency,
            booking_id: request.booking_id,
            metadata: request.metadata,
        })
        .await?;
    Ok(HttpResponse::Created().json(transfer))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/payments", web::post().to(create_payment))
            .route("/payments/{id}", web::get().to(get_payment))
            .route("/payments/{id}/refund", web::post().to(refund_payment))
            .route("/payouts", web::post().to(create_payout))
            .route("/transfers", web::post().to(create_transfer)),
    );
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub booking_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePayoutRequest {
    pub user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub booking_id: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub from_user_id: String,
    pub to_user_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub booking_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Omitted amount means a full refund.
#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    #[serde(flatten)]
    pub transaction: Transaction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub entries: Vec<LedgerEntry>,
}
