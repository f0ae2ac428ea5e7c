//! Error types for registry and handle operations.

use std::time::Duration;

use mongrid_core::ConfigError;
use thiserror::Error;

/// Result type alias for registry and handle operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors surfaced by the registry and the handle operation surface.
///
/// `Clone` so a single failed initialization can be handed to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("no filter groups specified for membership fetch")]
    EmptyFilter,

    #[error("no document matched the filter")]
    NotFound,

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

impl From<ConfigError> for PoolError {
    fn from(err: ConfigError) -> Self {
        PoolError::InvalidConfig(err.to_string())
    }
}
