//! Client error types

use shared::OrderId;
use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failure (connect refused, reset, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// 401/403 from any call
    #[error("Authentication required: {0}")]
    Auth(String),

    /// Non-2xx other than auth, or a `success: false` envelope
    #[error("Request failed: {0}")]
    Network(String),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Illegal input, rejected before any request
    #[error("Validation error: {0}")]
    Validation(String),

    /// A status transition for this order is already in flight
    #[error("Status change already in progress for order {0}")]
    TransitionPending(OrderId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No session is established
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Credentials were rejected at login
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Session persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
}

impl ClientError {
    /// Whether this error must tear the session down
    pub fn is_auth(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
