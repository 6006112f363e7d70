//! Worker error types.

use conference_core::error::DomainError;
use thiserror::Error;

/// Startup and shutdown errors for the worker.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A receiver could not be started.
    #[error("receiver error: {0}")]
    Receiver(#[from] DomainError),

    /// Signal handling or other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
