use serde::Serialize;

use crate::storage::StorageError;

/// Failure channel for every asynchronous checkout operation.
///
/// Pure pricing code never produces these; promo rejections and wizard
/// validation failures have their own result types and are only converted
/// into a `ServiceError` when they cross into an async call.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Payment cancelled: {0}")]
    PaymentCancelled(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Whether the user can reasonably retry the action that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExternalServiceError(_)
                | Self::Timeout(_)
                | Self::PaymentFailed(_)
                | Self::PaymentCancelled(_)
                | Self::Conflict(_)
                | Self::StorageError(_)
        )
    }

    /// Message suitable for showing to a shopper.
    /// Internal failures get a generic message so implementation details do not leak.
    pub fn user_message(&self) -> String {
        match self {
            Self::ValidationError(msg) | Self::InvalidInput(msg) | Self::Conflict(msg) => {
                msg.clone()
            }
            Self::PaymentFailed(_) => {
                "Payment could not be completed. Please try again.".to_string()
            }
            Self::PaymentCancelled(_) => "Payment was cancelled. You can try again.".to_string(),
            Self::ExternalServiceError(_) | Self::Timeout(_) => {
                "We could not reach the payment service. Please try again.".to_string()
            }
            Self::InvalidOperation(msg) | Self::NotFound(msg) => msg.clone(),
            Self::StorageError(_)
            | Self::SerializationError(_)
            | Self::ConfigError(_)
            | Self::InternalError(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else if err.is_decode() {
            ServiceError::SerializationError(err.to_string())
        } else {
            ServiceError::ExternalServiceError(err.to_string())
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}
