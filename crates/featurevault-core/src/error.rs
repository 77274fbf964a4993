//! Error types for featurevault
//!
//! This module defines all error types that can occur in the feature store.
//! We use the `thiserror` crate to make error definitions concise and ergonomic.
//!
//! ## Design Philosophy
//!
//! - Errors should be descriptive and actionable
//! - Use strongly-typed errors (not just strings)
//! - Stale writes are NOT errors: they are reported through `set_if_newer`
//!   returning `false` and through the ingestion report

use thiserror::Error;

/// Result type alias for operations that can fail
///
/// Instead of writing `Result<T, Error>` everywhere, we can just write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors that can occur in featurevault
#[derive(Error, Debug)]
pub enum Error {
    /// Storage backend error (Redis, PostgreSQL, DuckDB connectivity, etc.)
    ///
    /// This is a catch-all for errors from the underlying storage layer.
    /// We wrap the original error to preserve context.
    #[error("Storage error: {0}")]
    StorageError(#[from] anyhow::Error),

    /// Database query error
    ///
    /// Errors from SQL execution in the historical or PostgreSQL stores.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Serialization/deserialization error
    ///
    /// Occurs when a record cannot be converted to or from its stored JSON form.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input from the caller (e.g. an inverted time window)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A raw event could not be turned into feature records
    ///
    /// Raised by transformations; the coordinator drops the event and logs it.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// Operation attempted on a store after `close()`
    #[error("Store '{0}' is closed")]
    StoreClosed(&'static str),

    /// Internal error - this should rarely happen
    ///
    /// Used for unexpected errors that indicate a bug in our code
    /// (poisoned locks, panicked blocking tasks).
    #[error("Internal error: {0}")]
    InternalError(String),
}

// Helper implementations to make error creation more ergonomic

impl Error {
    /// Creates a DatabaseError from any error type
    pub fn database<E: std::error::Error>(err: E) -> Self {
        Self::DatabaseError(err.to_string())
    }

    /// Creates a ConfigError from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Creates an InvalidInput error from a string
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a MalformedEvent error from a string
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    /// Creates an InternalError from a string
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}
