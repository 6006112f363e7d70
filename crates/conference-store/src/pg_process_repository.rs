//! `PostgreSQL` implementation of `ProcessStateRepository`.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::process_manager::{ProcessRecord, ProcessStateRepository};
use conference_core::transport::COMMANDS_QUEUE;

use crate::error::map_sqlx;
use crate::outbox::enqueue;

/// Stores process manager state as JSON, one row per `(process_type, id)`.
/// Dispatched commands go to the `commands` queue in the same transaction.
#[derive(Debug, Clone)]
pub struct PgProcessRepository {
    pool: PgPool,
}

impl PgProcessRepository {
    /// Creates a new `PgProcessRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessStateRepository for PgProcessRepository {
    async fn load(
        &self,
        process_type: &str,
        id: Uuid,
    ) -> Result<Option<ProcessRecord>, DomainError> {
        let row = sqlx::query(
            "SELECT version, completed, state FROM process_managers WHERE process_type = $1 AND id = $2",
        )
        .bind(process_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|row| {
            Ok(ProcessRecord {
                id,
                process_type: process_type.to_owned(),
                version: row.try_get("version")?,
                completed: row.try_get("completed")?,
                state: row.try_get("state")?,
            })
        })
        .transpose()
        .map_err(map_sqlx)
    }

    async fn save(
        &self,
        record: &ProcessRecord,
        expected_version: i64,
        outbox: &[Message],
    ) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let written = if expected_version < 0 {
            sqlx::query(
                r"
                INSERT INTO process_managers (process_type, id, version, completed, state)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (process_type, id) DO NOTHING
                ",
            )
            .bind(&record.process_type)
            .bind(record.id)
            .bind(record.version)
            .bind(record.completed)
            .bind(&record.state)
            .execute(&mut *tx)
            .await
        } else {
            sqlx::query(
                r"
                UPDATE process_managers
                SET version = $3, completed = $4, state = $5, updated_at = NOW()
                WHERE process_type = $1 AND id = $2 AND version = $6
                ",
            )
            .bind(&record.process_type)
            .bind(record.id)
            .bind(record.version)
            .bind(record.completed)
            .bind(&record.state)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
        };
        let written = written.map_err(map_sqlx)?;

        if written.rows_affected() == 0 {
            drop(tx);
            let actual = self
                .load(&record.process_type, record.id)
                .await?
                .map_or(-1, |stored| stored.version);
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected: expected_version,
                actual,
            });
        }

        enqueue(&mut *tx, COMMANDS_QUEUE, outbox)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;

        debug!(
            process_type = %record.process_type,
            id = %record.id,
            version = record.version,
            commands = outbox.len(),
            "process state saved"
        );
        Ok(())
    }
}
