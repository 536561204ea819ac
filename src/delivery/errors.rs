//! # Delivery Errors

use thiserror::Error;

use crate::store::StoreError;

/// Result type for delivery operations
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Infrastructure failures of the delivery ledger.
///
/// A failed send is not an error here; it is recorded on the ledger and
/// reported as [`super::DeliveryOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl DeliveryError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            DeliveryError::NotFound(_) => 404,
            DeliveryError::Storage(e) => e.status_code(),
        }
    }
}
