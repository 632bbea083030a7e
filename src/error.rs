//! HTTP-facing error type
//!
//! Maps store and chain failures onto status codes, stable error codes and
//! user-facing messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chains::symbol::errors::SymbolError;
use crate::database::error::{DatabaseError, DatabaseErrorKind};

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PaymentNotFound,
    InvalidAddress,
    ValidationError,
    DatabaseError,
    BlockchainError,
    RateLimitError,
    ExternalServiceTimeout,
    ConfigurationError,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    PaymentNotFound { payment_id: String },
    InvalidAddress { address: String },
    Validation { field: String, message: String },
    Database { message: String, is_retryable: bool },
    Blockchain { message: String, is_retryable: bool },
    RateLimit,
    Timeout { millis: u64 },
    Configuration { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

/// Standardized error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    /// ISO 8601 timestamp of the error
    pub timestamp: String,
    pub retryable: bool,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn not_found(payment_id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::PaymentNotFound {
            payment_id: payment_id.into(),
        })
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation {
            field: field.into(),
            message: message.into(),
        })
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            AppErrorKind::PaymentNotFound { .. } => StatusCode::NOT_FOUND,
            AppErrorKind::InvalidAddress { .. } | AppErrorKind::Validation { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppErrorKind::Database { .. } | AppErrorKind::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppErrorKind::Blockchain { .. } => StatusCode::BAD_GATEWAY,
            AppErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            AppErrorKind::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
            AppErrorKind::InvalidAddress { .. } => ErrorCode::InvalidAddress,
            AppErrorKind::Validation { .. } => ErrorCode::ValidationError,
            AppErrorKind::Database { .. } => ErrorCode::DatabaseError,
            AppErrorKind::Blockchain { .. } => ErrorCode::BlockchainError,
            AppErrorKind::RateLimit => ErrorCode::RateLimitError,
            AppErrorKind::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            AppErrorKind::Configuration { .. } => ErrorCode::ConfigurationError,
        }
    }

    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::PaymentNotFound { payment_id } => {
                format!("Payment {} not found", payment_id)
            }
            AppErrorKind::InvalidAddress { address } => {
                format!("Invalid Symbol address: {}", address)
            }
            AppErrorKind::Validation { field, message } => {
                format!("Validation failed for field '{}': {}", field, message)
            }
            AppErrorKind::Database { .. } => {
                "A storage error occurred. Please try again later.".to_string()
            }
            AppErrorKind::Blockchain { .. } => {
                "The Symbol network is currently unreachable. Please try again later.".to_string()
            }
            AppErrorKind::RateLimit => "Too many requests to the Symbol network.".to_string(),
            AppErrorKind::Timeout { millis } => {
                format!("The Symbol network did not respond within {} ms", millis)
            }
            AppErrorKind::Configuration { .. } => {
                "The service is misconfigured. Please contact support.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Database { is_retryable, .. } => *is_retryable,
            AppErrorKind::Blockchain { is_retryable, .. } => *is_retryable,
            AppErrorKind::RateLimit | AppErrorKind::Timeout { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        let kind = match err.kind {
            DatabaseErrorKind::NotFound { id, .. } => AppErrorKind::PaymentNotFound { payment_id: id },
            other => AppErrorKind::Database {
                message: DatabaseError::new(other).to_string(),
                is_retryable,
            },
        };
        AppError::new(kind)
    }
}

impl From<SymbolError> for AppError {
    fn from(err: SymbolError) -> Self {
        let kind = match err {
            SymbolError::InvalidAddress { address } => AppErrorKind::InvalidAddress { address },
            SymbolError::Validation { message } => AppErrorKind::Validation {
                field: "payment".to_string(),
                message,
            },
            SymbolError::RateLimitError => AppErrorKind::RateLimit,
            SymbolError::TimeoutError { millis } => AppErrorKind::Timeout { millis },
            SymbolError::ConfigError { message } => AppErrorKind::Configuration { message },
            other => AppErrorKind::Blockchain {
                is_retryable: other.is_connectivity(),
                message: other.to_string(),
            },
        };
        AppError::new(kind)
    }
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError) -> Self {
        Self {
            error: error.error_code(),
            message: error.user_message(),
            request_id: error.request_id.clone(),
            timestamp: Utc::now().to_rfc3339(),
            retryable: error.is_retryable(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();

        if status_code.is_server_error() {
            tracing::error!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Server error occurred"
            );
        } else {
            tracing::warn!(
                error = ?self,
                request_id = ?self.request_id,
                status = %status_code.as_u16(),
                "Client error occurred"
            );
        }

        (status_code, Json(ErrorResponse::from_app_error(&self))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
