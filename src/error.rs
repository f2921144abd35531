//! Error types for channel-tracker
//!
//! This module provides the error handling used across the crate:
//! - A single [`Error`] enum for scheduler, processor, engine and persistence failures
//! - A nested [`DatabaseError`] for storage failures
//! - Context carried on the variants (channel id, attempt counts, failure class)
//!
//! Fetch failures keep the raw message produced by the external tool, because the
//! message text is the only signal available to
//! [`FailureClass::classify`](crate::engine::FailureClass::classify).

use crate::engine::FailureClass;
use crate::types::ChannelId;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for channel-tracker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for channel-tracker
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_jobs")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Tracked channel does not exist
    #[error("channel {0} not found")]
    ChannelNotFound(ChannelId),

    /// Tracked channel exists but is deactivated
    #[error("channel {0} is not active")]
    ChannelInactive(ChannelId),

    /// The fetch provider reported a failure (message is used for classification)
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// An external operation exceeded its hard timeout
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Every strategy attempt failed
    #[error(
        "{operation} failed after {attempts} attempts (last failure: {last_failure}): {last_error}"
    )]
    AttemptsExhausted {
        /// Logical operation name (e.g., "list-items")
        operation: String,
        /// Number of invocations actually made
        attempts: u32,
        /// Classification of the final failure
        last_failure: FailureClass,
        /// Message of the final failure
        last_error: String,
    },

    /// External tool could not be executed (missing binary, spawn failure)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Record already exists for this external item id
    #[error("duplicate download: {0}")]
    Duplicate(String),

    /// Shutdown in progress - not starting new work
    #[error("shutdown in progress: not starting new work")]
    ShuttingDown,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}
