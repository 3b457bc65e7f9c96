//! Error types for Bucketeer.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for Bucketeer operations.
///
/// A quota rejection is not an error: `try_consume` answers `Ok(false)`.
/// Everything here means no decision was made.
#[derive(Error, Debug)]
pub enum BucketeerError {
    /// The bucket key is empty or cannot be stored verbatim
    #[error("Invalid bucket key: {0}")]
    InvalidKey(String),

    /// A consume attempt asked for zero tokens
    #[error("Consume amount must be positive")]
    InvalidAmount,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The shared store could not produce a decision
    #[error("Bucket store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BucketeerError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BucketeerError::StoreUnavailable(e) if e.is_transient())
    }
}

/// Result type alias for Bucketeer operations.
pub type Result<T> = std::result::Result<T, BucketeerError>;
