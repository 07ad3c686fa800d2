//! # Access Errors

use thiserror::Error;

use crate::backend::BackendError;

/// Result type for permission lookups
pub type AccessResult<T> = Result<T, AccessError>;

/// Permission lookup errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// No signed-in user
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The granting row is absent; carries the user-facing denial
    #[error("{0}")]
    NotAuthorized(String),

    /// Role column holds a value outside the role registry
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// The lookup itself failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AccessError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::AuthenticationRequired => "CAMPUS_ACCESS_AUTHENTICATION_REQUIRED",
            AccessError::NotAuthorized(_) => "CAMPUS_ACCESS_NOT_AUTHORIZED",
            AccessError::UnknownRole(_) => "CAMPUS_ACCESS_UNKNOWN_ROLE",
            AccessError::Backend(_) => "CAMPUS_ACCESS_BACKEND",
        }
    }

    /// Denial as opposed to a failed lookup
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AccessError::AuthenticationRequired
                | AccessError::NotAuthorized(_)
                | AccessError::UnknownRole(_)
        )
    }
}
