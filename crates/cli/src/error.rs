//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// CLI override rejected
    #[error("Invalid override {flag}: {message}")]
    InvalidOverride { flag: String, message: String },

    /// Snapshot could not be written
    #[error("Failed to write snapshot {path}: {message}")]
    Snapshot { path: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_override(flag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOverride {
            flag: flag.into(),
            message: message.into(),
        }
    }

    pub fn snapshot(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Snapshot {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
