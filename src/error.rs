//! Error types for the event-inbox library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the lifecycle engine.

use rusqlite::ffi;
use thiserror::Error;

/// Errors that can occur in the event-inbox library.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// An item or message referenced a channel that does not exist for its user
    #[error("Channel not found: {0}")]
    ChannelNotFound(i64),

    /// Caller-supplied data failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking storage task failed to complete
    #[error("Background task failed: {0}")]
    Task(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `LifecycleError`
pub type Result<T> = std::result::Result<T, LifecycleError>;

impl LifecycleError {
    /// Whether a collaborator may retry the failed call unchanged.
    ///
    /// A missing channel stays missing until an operator intervenes, and bad input
    /// stays bad; everything else is treated as transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::ChannelNotFound(_) | Self::InvalidInput(_) | Self::InvalidConfig(_))
    }
}

impl From<anyhow::Error> for LifecycleError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LifecycleError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// True when `err` is a foreign-key violation reported by SQLite.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.extended_code == ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// True when `err` is a UNIQUE or PRIMARY KEY violation reported by SQLite.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}
