//! Mapping from `sqlx` errors to domain errors.

use conference_core::error::DomainError;

/// Connection-level failures are transient; everything else is not.
pub(crate) fn map_sqlx(err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DomainError::TransportUnavailable(err.to_string()),
        _ => DomainError::Infrastructure(err.to_string()),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}
