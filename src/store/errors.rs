//! # Store Errors
//!
//! Infrastructure failures of the record store. Domain modules wrap these
//! and report them as internal errors.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Record store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(&'static str),

    /// A row referenced by the write does not exist
    #[error("Dangling reference: {0}")]
    DanglingReference(&'static str),

    /// The audit sink refused the records of this unit of work
    #[error("Audit sink unavailable: {0}")]
    AuditUnavailable(String),

    /// Snapshot I/O failed
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Snapshot could not be decoded
    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    /// Lock poisoned by a panicking writer
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::UniqueViolation(_) => 409,
            _ => 500,
        }
    }
}
