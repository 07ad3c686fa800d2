//! # Backend Errors
//!
//! Error types returned by the hosted-backend services.

use thiserror::Error;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    // ==================
    // Transport Errors
    // ==================
    /// The backend could not be reached
    #[error("Network error: {0}")]
    Network(String),

    /// The connection was closed by the backend
    #[error("Connection closed")]
    ConnectionClosed,

    // ==================
    // Query Errors
    // ==================
    /// The backend rejected the query
    #[error("Query failed: {0}")]
    Query(String),

    /// Filter expression could not be parsed
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Table does not exist
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    // ==================
    // Authorization Errors
    // ==================
    /// The request requires a signed-in user
    #[error("Authentication required")]
    AuthenticationRequired,

    /// Row-level security rejected the request
    #[error("Not authorized to access this resource")]
    Unauthorized,

    // ==================
    // Realtime Errors
    // ==================
    /// The change feed refused the registration
    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),
}

impl BackendError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Network(_) => "CAMPUS_BACKEND_NETWORK",
            BackendError::ConnectionClosed => "CAMPUS_BACKEND_CLOSED",
            BackendError::Query(_) => "CAMPUS_BACKEND_QUERY",
            BackendError::InvalidFilter(_) => "CAMPUS_BACKEND_INVALID_FILTER",
            BackendError::UnknownTable(_) => "CAMPUS_BACKEND_UNKNOWN_TABLE",
            BackendError::AuthenticationRequired => "CAMPUS_BACKEND_AUTH_REQUIRED",
            BackendError::Unauthorized => "CAMPUS_BACKEND_UNAUTHORIZED",
            BackendError::SubscriptionRejected(_) => "CAMPUS_BACKEND_SUBSCRIPTION_REJECTED",
        }
    }

    /// Whether the error came from the transport rather than the request
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackendError::Network(_) | BackendError::ConnectionClosed
        )
    }
}
