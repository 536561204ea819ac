//! # Scheduler Errors

use thiserror::Error;

/// Result type for schedule parsing
pub type ScheduleResult<T> = Result<T, ScheduleError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },
}

impl ScheduleError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ScheduleError::InvalidCron { .. } => 400,
        }
    }
}
