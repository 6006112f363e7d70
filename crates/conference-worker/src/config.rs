//! Worker configuration, read once from the environment at startup.

use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use conference_messaging::receiver::ReceiverConfig;
use conference_messaging::retry::RetryPolicy;

use crate::error::AppError;

/// Everything the worker needs to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Pause after finding a queue empty.
    pub poll_interval: Duration,
    /// How long a claimed message stays invisible to other receivers.
    pub lease: TimeDelta,
    /// Pause after a handler failure.
    pub failure_delay: Duration,
    /// Cap on the backoff while a queue is unreachable.
    pub max_backoff: Duration,
    /// How long seats are held for an order awaiting payment.
    pub reservation_window: TimeDelta,
}

impl WorkerConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is unset or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of
    /// an environment variable if set.
    ///
    /// # Errors
    ///
    /// As [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL environment variable must be set".into()))?;

        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10_u32)?;
        let poll_interval_ms = parse_or(&lookup, "RECEIVER_POLL_INTERVAL_MS", 500_u64)?;
        let lease_secs = parse_or(&lookup, "RECEIVER_LEASE_SECS", 60_i64)?;
        let failure_delay_ms = parse_or(&lookup, "RECEIVER_FAILURE_DELAY_MS", 1000_u64)?;
        let max_backoff_ms = parse_or(&lookup, "RECEIVER_MAX_BACKOFF_MS", 30_000_u64)?;
        let expiration_minutes = parse_or(&lookup, "REGISTRATION_EXPIRATION_MINUTES", 15_i64)?;

        if max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
            ));
        }
        let lease = positive_delta("RECEIVER_LEASE_SECS", lease_secs, TimeDelta::try_seconds)?;
        let reservation_window = positive_delta(
            "REGISTRATION_EXPIRATION_MINUTES",
            expiration_minutes,
            TimeDelta::try_minutes,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            poll_interval: Duration::from_millis(poll_interval_ms),
            lease,
            failure_delay: Duration::from_millis(failure_delay_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            reservation_window,
        })
    }

    /// Receiver timing derived from this configuration.
    #[must_use]
    pub fn receiver_config(&self) -> ReceiverConfig {
        ReceiverConfig {
            poll_interval: self.poll_interval,
            failure_delay: self.failure_delay,
            retry: RetryPolicy::default().with_max_delay(self.max_backoff),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} must be a valid number: {e}"))),
    }
}

fn positive_delta(
    key: &str,
    value: i64,
    to_delta: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, AppError> {
    if value <= 0 {
        return Err(AppError::Config(format!("{key} must be positive")));
    }
    to_delta(value).ok_or_else(|| AppError::Config(format!("{key} is out of range")))
}
