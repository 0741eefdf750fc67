// Provider adapters: one PaymentProvider implementation per external API

pub mod http;
pub mod kirimpay;
pub mod nusapay;
pub mod provider_trait;
pub mod qrispay;
pub mod registry;

pub use http::provider_http_client;
pub use kirimpay::{KirimpayProvider, KIRIMPAY};
pub use nusapay::{NusapayProvider, NUSAPAY};
pub use provider_trait::{
    PaymentMethod, PaymentProvider, ProviderChargeRequest, ProviderPayment,
    ProviderPaymentStatus, ProviderPayoutRequest, WebhookEvent, WebhookKind,
};
pub use qrispay::{QrispayProvider, QRISPAY};
pub use registry::ProviderRegistry;
