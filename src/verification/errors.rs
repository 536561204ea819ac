//! # Verification Errors

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::store::StoreError;
use crate::switch::SwitchError;

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Verifier-facing and quorum errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    // ==================
    // Vote token errors
    // ==================
    /// No token with this value
    #[error("Verification link is invalid")]
    TokenNotFound,

    /// Link window has closed
    #[error("Verification link has expired")]
    LinkExpired,

    /// Token already consumed
    #[error("Verification link has already been used")]
    TokenUsed,

    /// OTP does not match
    #[error("Invalid verification code")]
    InvalidOtp,

    /// OTP window has closed
    #[error("Verification code has expired")]
    OtpExpired,

    /// The request was already resolved
    #[error("Verification request is already completed")]
    RequestCompleted,

    /// This verifier already voted on the request
    #[error("A vote has already been recorded for this verifier")]
    AlreadyVoted,

    /// Verifier was revoked after the token was issued
    #[error("Verifier has been revoked")]
    VerifierRevoked,

    // ==================
    // Request errors
    // ==================
    /// Not enough accepted verifiers, or verifiers disabled
    #[error("Insufficient verifiers: {0}")]
    InsufficientVerifiers(String),

    // ==================
    // Invitation errors
    // ==================
    #[error("Invitation is invalid")]
    InvitationNotFound,

    #[error("Invitation has expired")]
    InvitationExpired,

    #[error("Verifier already exists for this switch")]
    VerifierExists,

    // ==================
    // Wrapped
    // ==================
    #[error(transparent)]
    Switch(#[from] SwitchError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl VerificationError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            VerificationError::TokenNotFound | VerificationError::InvitationNotFound => 404,
            VerificationError::LinkExpired
            | VerificationError::OtpExpired
            | VerificationError::InvitationExpired => 410,
            VerificationError::TokenUsed
            | VerificationError::RequestCompleted
            | VerificationError::AlreadyVoted
            | VerificationError::InsufficientVerifiers(_)
            | VerificationError::VerifierExists => 409,
            VerificationError::InvalidOtp | VerificationError::VerifierRevoked => 403,
            VerificationError::Switch(e) => e.status_code(),
            VerificationError::Crypto(e) => e.status_code(),
            VerificationError::Storage(e) => e.status_code(),
        }
    }

    /// Machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            VerificationError::TokenNotFound => "TOKEN_NOT_FOUND",
            VerificationError::LinkExpired => "LINK_EXPIRED",
            VerificationError::TokenUsed => "TOKEN_USED",
            VerificationError::InvalidOtp => "INVALID_OTP",
            VerificationError::OtpExpired => "OTP_EXPIRED",
            VerificationError::RequestCompleted => "REQUEST_COMPLETED",
            VerificationError::AlreadyVoted => "ALREADY_VOTED",
            VerificationError::VerifierRevoked => "VERIFIER_REVOKED",
            VerificationError::InsufficientVerifiers(_) => "INSUFFICIENT_VERIFIERS",
            VerificationError::InvitationNotFound => "INVITATION_NOT_FOUND",
            VerificationError::InvitationExpired => "INVITATION_EXPIRED",
            VerificationError::VerifierExists => "VERIFIER_EXISTS",
            VerificationError::Switch(_) => "SWITCH_ERROR",
            VerificationError::Crypto(_) => "CRYPTO_ERROR",
            VerificationError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
