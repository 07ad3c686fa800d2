//! # Real-Time Errors
//!
//! Error types for the realtime subscription adapter.

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for real-time operations
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Real-time errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RealtimeError {
    /// Channel name is empty
    #[error("Channel name must not be empty")]
    EmptyChannel,

    /// Table name is empty
    #[error("Table name must not be empty")]
    EmptyTable,

    /// Row filter could not be parsed
    #[error("Invalid row filter: {0}")]
    InvalidFilter(String),
}

impl RealtimeError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::EmptyChannel => "CAMPUS_REALTIME_EMPTY_CHANNEL",
            RealtimeError::EmptyTable => "CAMPUS_REALTIME_EMPTY_TABLE",
            RealtimeError::InvalidFilter(_) => "CAMPUS_REALTIME_INVALID_FILTER",
        }
    }
}

impl From<BackendError> for RealtimeError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::InvalidFilter(reason) => RealtimeError::InvalidFilter(reason),
            other => RealtimeError::InvalidFilter(other.to_string()),
        }
    }
}
