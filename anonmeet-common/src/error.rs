//! Common error types for anonmeet

use thiserror::Error;

/// Common result type for anonmeet operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Profile storage failure
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected submission or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
