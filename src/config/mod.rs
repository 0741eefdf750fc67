use crate::core::{AppError, Result};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub nusapay: ProviderConfig,
    pub qrispay: ProviderConfig,
    pub kirimpay: ProviderConfig,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

/// Credentials and endpoint for one payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub api_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

impl ProviderConfig {
    fn from_env(prefix: &str, default_base_url: &str) -> Result<Self> {
        Ok(ProviderConfig {
            api_key: require(&format!("{}_API_KEY", prefix))?,
            webhook_secret: require(&format!("{}_WEBHOOK_SECRET", prefix))?,
            base_url: env::var(format!("{}_BASE_URL", prefix))
                .unwrap_or_else(|_| default_base_url.to_string()),
        })
    }
}

/// Orchestration policy: provider routing, timeouts, idempotency retention,
/// and the optional escrow-release commission.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    pub provider_timeout_secs: u64,
    pub processing_timeout_secs: u64,
    pub retention_days: u64,
    pub card_provider: String,
    pub qr_provider: String,
    pub payout_provider: String,
    pub charge_fallback: Option<String>,
    /// Basis points taken from escrow releases; releases are rejected when unset
    pub commission_rate_bps: Option<u32>,
    pub sweep_interval_secs: u64,
    pub reconcile_interval_secs: u64,
    /// Owner of the platform escrow and commission reserve accounts
    pub platform_user_id: String,
}

impl PaymentsConfig {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn processing_timeout(&self) -> Duration {
        Duration::from_secs(self.processing_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days * 86_400)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            nusapay: ProviderConfig::from_env("NUSAPAY", "https://api.nusapay.co.id")?,
            qrispay: ProviderConfig::from_env("QRISPAY", "https://api.qrispay.id")?,
            kirimpay: ProviderConfig::from_env("KIRIMPAY", "https://api.kirimpay.co.id")?,
            payments: PaymentsConfig {
                provider_timeout_secs: parse_env("PROVIDER_TIMEOUT_SECS", "20")?,
                processing_timeout_secs: parse_env("PROCESSING_TIMEOUT_SECS", "300")?,
                retention_days: parse_env("IDEMPOTENCY_RETENTION_DAYS", "90")?,
                card_provider: env::var("CARD_PROVIDER").unwrap_or_else(|_| "nusapay".to_string()),
                qr_provider: env::var("QR_PROVIDER").unwrap_or_else(|_| "qrispay".to_string()),
                payout_provider: env::var("PAYOUT_PROVIDER")
                    .unwrap_or_else(|_| "kirimpay".to_string()),
                charge_fallback: env::var("CHARGE_FALLBACK_PROVIDER").ok(),
                commission_rate_bps: match env::var("COMMISSION_RATE_BPS") {
                    Ok(raw) => Some(raw.parse().map_err(|_| {
                        AppError::Configuration("Invalid COMMISSION_RATE_BPS".to_string())
                    })?),
                    Err(_) => None,
                },
                sweep_interval_secs: parse_env("SWEEP_INTERVAL_SECS", "300")?,
                reconcile_interval_secs: parse_env("RECONCILE_INTERVAL_SECS", "3600")?,
                platform_user_id: env::var("PLATFORM_USER_ID")
                    .unwrap_or_else(|_| "platform".to_string()),
            },
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.payments.provider_timeout_secs == 0 || self.payments.provider_timeout_secs > 120 {
            return Err(AppError::Configuration(
                "Provider timeout must be between 1 and 120 seconds".to_string(),
            ));
        }

        if self.payments.processing_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Processing timeout must be greater than 0".to_string(),
            ));
        }

        if self.payments.retention_days == 0 {
            return Err(AppError::Configuration(
                "Idempotency retention must be at least one day".to_string(),
            ));
        }

        if self.payments.sweep_interval_secs == 0 || self.payments.reconcile_interval_secs == 0 {
            return Err(AppError::Configuration(
                "Background job intervals must be greater than 0".to_string(),
            ));
        }

        if let Some(rate_bps) = self.payments.commission_rate_bps {
            if rate_bps > 10_000 {
                return Err(AppError::Configuration(
                    "Commission rate cannot exceed 10000 basis points".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn require(name: &str) -> Result<String> {
    env::var(name).map_err(|_| AppError::Configuration(format!("{} not set", name)))
}

fn parse_env(name: &str, default: &str) -> Result<u64> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::Configuration(format!("Invalid {}", name)))
}
