use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::responses::{ApiResponse, ErrorResponse};
use crate::idempotency::codec::BufferedResponse;

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store unavailable: {0}")]
    Store(String),

    #[error("Failed to decode cached response: {0}")]
    Decode(String),

    #[error("Downstream handler failed with status {}", .0.status)]
    Downstream(Box<BufferedResponse>),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True when the shared store could not complete an operation.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AppError::Redis(_) | AppError::Store(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Redis(_) | AppError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Downstream(response) => response.status,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Decode(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Redis(_) | AppError::Store(_) => "STORE_UNAVAILABLE",
            AppError::Decode(_) => "CACHE_DECODE_ERROR",
            AppError::Downstream(_) => "DOWNSTREAM_FAILURE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Redis(_) | AppError::Store(_) => {
                "Idempotency store is unavailable, retry later".to_string()
            }
            AppError::Validation(msg) => msg.clone(),
            AppError::Downstream(_) => String::new(),
            _ => "An internal error occurred".to_string(),
        };

        match self {
            // The handler's own failure response goes back to the caller untouched.
            AppError::Downstream(response) => response.into_response(),
            other => {
                tracing::error!(error = %other, "Request failed in idempotency gate");
                (
                    status,
                    Json(ApiResponse::<()>::error(ErrorResponse::new(other.code(), message))),
                )
                    .into_response()
            }
        }
    }
}
