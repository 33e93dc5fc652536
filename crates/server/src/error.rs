use crate::email_verification::EmailValidationError;
use crate::signer::SignError;
use crate::store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// OAuth2 style error body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing or malformed parameters.
    #[error("{0}")]
    ClientInput(String),
    /// Authorization code that was never issued.
    #[error("{0}")]
    InvalidGrant(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    /// Authorization code replay. The token issued for it has been revoked.
    #[error("{0}")]
    SecurityViolation(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
    #[error("Signing failure: {0}")]
    Signing(#[from] SignError),
    #[error("Randomness unavailable: {0}")]
    Randomness(#[from] getrandom::Error),
    #[error("Template rendering failed: {0}")]
    Template(#[from] askama::Error),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
    #[error("{0}")]
    ExternalDependency(String),
}

impl ProviderError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProviderError::ClientInput(_)
            | ProviderError::InvalidGrant(_)
            | ProviderError::SecurityViolation(_) => StatusCode::BAD_REQUEST,
            ProviderError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ProviderError::Forbidden(_) => StatusCode::FORBIDDEN,
            ProviderError::NotFound(_) => StatusCode::NOT_FOUND,
            ProviderError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ProviderError::Storage(_)
            | ProviderError::Signing(_)
            | ProviderError::Randomness(_)
            | ProviderError::Template(_)
            | ProviderError::Serialization(_)
            | ProviderError::Header(_)
            | ProviderError::ExternalDependency(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `error` member of the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::ClientInput(_) => "invalid_request",
            ProviderError::InvalidGrant(_) | ProviderError::SecurityViolation(_) => {
                "invalid_grant"
            }
            ProviderError::Unauthorized(_) => "unauthorized",
            ProviderError::Forbidden(_) => "access_denied",
            ProviderError::NotFound(_) => "not_found",
            ProviderError::RateLimited(_) => "slow_down",
            _ => "server_error",
        }
    }
}

impl From<EmailValidationError> for ProviderError {
    fn from(e: EmailValidationError) -> Self {
        match e {
            EmailValidationError::InvalidEmail
            | EmailValidationError::NotFound
            | EmailValidationError::CodeMismatch
            | EmailValidationError::Expired
            | EmailValidationError::AttemptsExhausted => ProviderError::ClientInput(e.to_string()),
            EmailValidationError::RateLimited => ProviderError::RateLimited(e.to_string()),
            EmailValidationError::Store(e) => ProviderError::Storage(e),
            EmailValidationError::Delivery(e) => ProviderError::ExternalDependency(e.to_string()),
            EmailValidationError::Randomness(e) => ProviderError::Randomness(e),
        }
    }
}

impl IntoResponse for ProviderError {
    fn into_response(self) -> Response {
        let status = self.status();
        let description = if status.is_server_error() {
            tracing::error!(name = "provider.internal_error", error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(ErrorResponse {
                error: self.code().to_string(),
                error_description: Some(description),
            }),
        )
            .into_response()
    }
}
