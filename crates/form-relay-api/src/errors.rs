//! API error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use form_relay_core::subscription::SubscriptionError;
use form_relay_core::{ProviderError, StoreError, ValidationError};
use serde_json::json;

/// Failures surfaced by the HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API key required")]
    Unauthorized,

    #[error("{what} not found")]
    NotFound { what: &'static str },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<SubscriptionError> for ApiError {
    fn from(error: SubscriptionError) -> Self {
        match error {
            SubscriptionError::NotFound { .. } => Self::NotFound {
                what: "subscription",
            },
            SubscriptionError::InvalidEvent { .. } | SubscriptionError::InvalidUrl(_) => {
                Self::BadRequest {
                    message: error.to_string(),
                }
            }
            SubscriptionError::Store(store_error) => Self::Internal {
                message: store_error.to_string(),
            },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Internal {
            message: error.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(error: ValidationError) -> Self {
        Self::BadRequest {
            message: error.to_string(),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Configuration { .. }
            | ProviderError::CredentialMismatch { .. }
            | ProviderError::Unsupported { .. } => Self::BadRequest {
                message: error.to_string(),
            },
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
