//! CLI-specific error types
//!
//! All CLI errors are fatal: the process prints the error and exits non-zero.

use std::io;

use thiserror::Error;

use crate::app::AppError;
use crate::config::ConfigError;

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Config file already exists: {0}")]
    AlreadyInitialized(String),

    #[error("Boot failed: {0}")]
    BootFailed(String),
}

impl CliError {
    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        match self {
            CliError::Config(_) => "DEADSWITCH_CLI_CONFIG_ERROR",
            CliError::Io(_) => "DEADSWITCH_CLI_IO_ERROR",
            CliError::AlreadyInitialized(_) => "DEADSWITCH_CLI_ALREADY_INITIALIZED",
            CliError::BootFailed(_) => "DEADSWITCH_CLI_BOOT_FAILED",
        }
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Config(e) => CliError::Config(e),
            other => CliError::BootFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CliError::AlreadyInitialized("x".into()).code_str(),
            "DEADSWITCH_CLI_ALREADY_INITIALIZED"
        );
        let boot: CliError = AppError::Audit("denied".into()).into();
        assert_eq!(boot.code_str(), "DEADSWITCH_CLI_BOOT_FAILED");
        let config: CliError = AppError::Config(ConfigError::Invalid("x".into())).into();
        assert_eq!(config.code_str(), "DEADSWITCH_CLI_CONFIG_ERROR");
    }
}
