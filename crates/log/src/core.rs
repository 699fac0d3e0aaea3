//! Error types

use thiserror::Error;

/// Logging setup errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("invalid log filter {0}")]
    Filter(String),

    /// The configuration could not be applied
    #[error("logging configuration error: {0}")]
    Config(String),

    /// A global subscriber is already installed
    #[error("a global logger is already initialized")]
    AlreadyInitialized,
}

/// Result alias for logging setup
pub type LogResult<T> = Result<T, LogError>;
