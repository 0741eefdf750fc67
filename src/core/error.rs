use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};

/// Application-wide Result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Main application error type
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Webhook or API caller failed authentication (bad/missing signature)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The event or resource was already processed/recorded
    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// Another handler currently holds the idempotency lock for this event
    #[error("Concurrent processing in progress: {0}")]
    Concurrent(String),

    /// Validation errors for business rules, with a stable machine code
    #[error("Validation error [{code}]: {message}")]
    Validation { code: String, message: String },

    /// Provider timeout, connection failure, or 5xx
    #[error("Provider unavailable [{provider}]: {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Ledger invariant broken (unbalanced entries, negative balance, terminal mutation)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();

        HttpResponse::build(status_code).json(serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Concurrent(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            AppError::InvariantViolation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Helper functions for common error scenarios
impl AppError {
    pub fn authentication(msg: impl Into<String>) -> Self {
        AppError::Authentication(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        AppError::Duplicate(msg.into())
    }

    pub fn concurrent(msg: impl Into<String>) -> Self {
        AppError::Concurrent(msg.into())
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn provider_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        AppError::InvariantViolation(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }

    /// Stable machine-readable code for structured error bodies and logs.
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Authentication(_) => "authentication_failed",
            AppError::Duplicate(_) => "duplicate",
            AppError::Concurrent(_) => "concurrent_processing",
            AppError::Validation { code, .. } => code,
            AppError::ProviderUnavailable { .. } => "provider_unavailable",
            AppError::InvariantViolation(_) => "invariant_violation",
            AppError::NotFound(_) => "not_found",
            AppError::Database(_) => "database_error",
            AppError::Configuration(_) => "configuration_error",
            AppError::HttpClient(_) => "http_client_error",
            AppError::Json(_) => "json_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// True for transport-level provider failures that the routing policy may
    /// retry against a fallback provider. Validation and business rejections
    /// must never return true here.
    pub fn is_provider_unavailable(&self) -> bool {
        matches!(
            self,
            AppError::ProviderUnavailable { .. } | AppError::HttpClient(_)
        )
    }
}

/// Detects unique key violations so repositories can map them to
/// `AppError::Duplicate` instead of a generic database error.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}
