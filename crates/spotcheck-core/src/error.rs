//! Error types for spotcheck-core

use thiserror::Error;

/// Result type alias using spotcheck-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in spotcheck-core operations
///
/// Policy outcomes (ambiguous, blocked, too far, already validated) are not
/// errors; they are variants of the outcome enums returned by the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Location not found
    #[error("Location not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller is not allowed to act on this location
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Creators cannot corroborate their own locations
    #[error("Creators cannot validate their own location")]
    SelfValidation,

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking database task panicked or was cancelled
    #[error("Database task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// True for errors caused by the request itself rather than the store.
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::SelfValidation)
    }
}
