//! # Switch Errors

use thiserror::Error;

use super::state::SwitchStatus;
use crate::crypto::CryptoError;
use crate::store::StoreError;

/// Result type for switch operations
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Owner-facing lifecycle errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// Malformed input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Caller does not own the resource, or lacks the admin role
    #[error("Not authorized to access this resource")]
    Unauthorized,

    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Edge not in the transition graph
    #[error("Invalid transition: {from} → {to}")]
    InvalidTransition { from: SwitchStatus, to: SwitchStatus },

    /// Check-in attempted from a resting state
    #[error("Check-in not allowed while {0}")]
    InvalidCheckIn(SwitchStatus),

    /// Configuration edits are not allowed in this status
    #[error("Switch cannot be modified while {0}")]
    NotEditable(SwitchStatus),

    /// Recipient already has a message
    #[error("Recipient already has a message")]
    MessageExists,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl SwitchError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            SwitchError::Validation(_) => 400,
            SwitchError::Unauthorized => 403,
            SwitchError::NotFound(_) => 404,
            SwitchError::InvalidTransition { .. }
            | SwitchError::InvalidCheckIn(_)
            | SwitchError::NotEditable(_)
            | SwitchError::MessageExists => 409,
            SwitchError::Crypto(e) => e.status_code(),
            SwitchError::Storage(e) => e.status_code(),
        }
    }

    /// Returns whether this error is the caller's fault
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
