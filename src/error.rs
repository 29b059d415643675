//! Error Module
//!
//! Failure taxonomy shared by the session client and the synchronizer.

use crate::profile::decoder::DecodeError;
use crate::storage::StorageError;

/// Result alias for companion operations
pub type CompanionResult<T> = Result<T, CompanionError>;

/// Companion API errors
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    /// The API server could not be reached, timed out, or answered with an error status.
    #[error("Failed to contact API server: {0}")]
    Contact(String),

    /// Credentials or confirmation code were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// An operation was invoked while the session was in the wrong state.
    #[error("Illegal session state: {0}")]
    IllegalState(String),

    /// The server answered with something the state machine does not recognise.
    #[error("Unexpected response from API server (status {status}, location {location:?})")]
    UnexpectedResponse {
        status: u16,
        location: Option<String>,
    },

    #[error("Profile decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl CompanionError {
    /// Whether the caller may retry the same operation without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompanionError::Contact(_) | CompanionError::UnexpectedResponse { .. }
        )
    }

    /// Whether new credentials or a new confirmation code are required.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, CompanionError::Authentication(_))
    }
}

impl From<reqwest::Error> for CompanionError {
    fn from(err: reqwest::Error) -> Self {
        CompanionError::Contact(err.to_string())
    }
}
