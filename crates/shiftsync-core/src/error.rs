//! Core error types for shiftsync-core.
//!
//! This module defines the error hierarchy using thiserror. Storage, config
//! and OAuth errors each have their own enum; `CoreError` rolls them up for
//! the CLI.

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::types::SyncError;

/// Core error type for shiftsync-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reconciliation or adapter errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// OAuth-related errors
    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Another connection holds the database lock. Retryable.
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Uniqueness / check constraint violated. Never retried.
    #[error("Integrity constraint violated: {0}")]
    Integrity(String),

    /// The retry budget ran out while the database stayed busy.
    #[error("Database unavailable: {operation} still busy after {attempts} attempts")]
    Unavailable { operation: String, attempts: u32 },
}

impl DatabaseError {
    /// Whether the failure is transient contention worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::Busy(_))
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// OAuth-specific errors.
#[derive(Error, Debug)]
pub enum OAuthError {
    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Transport failure while talking to the token endpoint
    #[error("Token endpoint unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => match code.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    DatabaseError::Busy(err.to_string())
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    DatabaseError::Integrity(err.to_string())
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
