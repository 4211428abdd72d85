//! Error types for Tollgate.

use thiserror::Error;

use crate::ratelimit::StoreError;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bucket store errors (only surfaced when the store is used directly)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
