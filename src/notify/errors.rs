//! # Notification Errors

use thiserror::Error;

/// Result type for notifier operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Mail transport errors. Always non-fatal to the state change that
/// triggered the send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl NotifyError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            NotifyError::InvalidAddress(_) => 400,
            NotifyError::Build(_) => 500,
            NotifyError::Transport(_) => 502,
        }
    }
}
