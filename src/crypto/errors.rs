//! # Crypto Errors

use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Confidentiality layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Any structural, tag or key failure while opening a blob.
    /// Deliberately carries no detail.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Sealing failed (key derivation or cipher error)
    #[error("Internal error: encryption failed")]
    EncryptionFailed,

    /// Master key does not meet minimum requirements
    #[error("Invalid master key: {0}")]
    InvalidMasterKey(String),

    /// OTP hashing failed
    #[error("Internal error: OTP hashing failed")]
    HashingFailed,
}

impl CryptoError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CryptoError::InvalidMasterKey(_) => 400,
            CryptoError::DecryptionFailed
            | CryptoError::EncryptionFailed
            | CryptoError::HashingFailed => 500,
        }
    }
}
