//! Structured error types for contentctl-store.
//!
//! Store-tier failures surface to the caller; cache-tier failures never do
//! (see [`crate::cache::CacheError`]). The CLI wraps these in `anyhow`.

use std::time::Duration;
use thiserror::Error;

use crate::models::ValidationError;

/// Main error type for store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Pool or transport failure (timeout, refused, I/O). Retryable by the caller.
    #[error("connection error: {source}")]
    Connection {
        #[source]
        source: sqlx::Error,
    },

    /// Establishing the pool did not finish within the connect timeout
    #[error("connection error: store did not answer within {0:?}")]
    ConnectTimeout(Duration),

    /// Statement failed for a reason other than transport
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A migration script failed; the process must not start serving
    #[error("migration '{name}' failed: {reason}")]
    MigrationFailure { name: String, reason: String },

    /// Required field missing or empty
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration could not be read or is invalid
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Create a migration failure for the named script
    pub fn migration(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::MigrationFailure {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True for failures a caller may retry (pool exhaustion, refused, timeouts)
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ConnectTimeout(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => Self::Connection { source: err },
            other => Self::Database(other),
        }
    }
}
