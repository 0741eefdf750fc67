pub mod orchestrator;
pub mod webhook_processor;

pub use orchestrator::{
    ChargeOutcome, ChargeRequest, CommissionPolicy, PaymentOrchestrator, PayoutRequest,
    RoutingConfig, TransferRequest,
};
pub use webhook_processor::{WebhookOutcome, WebhookProcessor};
