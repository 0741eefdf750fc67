use crate::core::{AppError, Result};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::Duration;

const MAX_TRANSIENT_RETRIES: u32 = 2;

/// HTTP client shared by the provider adapters: bounded timeout plus
/// exponential-backoff retry of transient failures. The idempotency headers
/// the adapters attach make the retries safe.
pub fn provider_http_client(timeout: Duration) -> Result<ClientWithMiddleware> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()?;

    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_TRANSIENT_RETRIES);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Connection failures and timeouts become `ProviderUnavailable` so the
/// orchestrator's fallback policy can see them.
pub(crate) fn transport_error(provider: &str, err: reqwest_middleware::Error) -> AppError {
    AppError::provider_unavailable(provider, format!("Request failed: {}", err))
}

/// Classifies a non-success provider response: 5xx may be retried against a
/// fallback, anything else is a rejected request.
pub(crate) fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> AppError {
    if status.is_server_error() {
        AppError::provider_unavailable(
            provider,
            format!("HTTP {} ({})", status.as_u16(), body),
        )
    } else {
        AppError::validation(
            "provider_rejected",
            format!("{} rejected the request: HTTP {} ({})", provider, status.as_u16(), body),
        )
    }
}
