//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::repository::{EventRepository, StoredEvent, ensure_contiguous};
use conference_core::transport::EVENTS_QUEUE;

use crate::error::{is_unique_violation, map_sqlx};
use crate::outbox::enqueue;

/// PostgreSQL-backed event repository. Published events are written to the
/// `events` queue in the append transaction.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), -1) FROM domain_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(
            r"
            SELECT event_id, aggregate_id, aggregate_type, event_type, payload,
                   version, correlation_id, occurred_at
            FROM domain_events
            WHERE aggregate_id = $1
            ORDER BY version
            ",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.iter()
            .map(|row| {
                Ok(StoredEvent {
                    event_id: row.try_get("event_id")?,
                    aggregate_id: row.try_get("aggregate_id")?,
                    aggregate_type: row.try_get("aggregate_type")?,
                    event_type: row.try_get("event_type")?,
                    payload: row.try_get("payload")?,
                    version: row.try_get("version")?,
                    correlation_id: row.try_get("correlation_id")?,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<_, sqlx::Error>>()
            .map_err(map_sqlx)
    }

    #[instrument(skip(self, events, outbox), fields(events = events.len(), messages = outbox.len()))]
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        outbox: &[Message],
    ) -> Result<(), DomainError> {
        ensure_contiguous(aggregate_id, expected_version, events)?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let actual: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), -1) FROM domain_events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(
                r"
                INSERT INTO domain_events
                    (event_id, aggregate_id, aggregate_type, event_type, payload,
                     version, correlation_id, occurred_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(event.event_id)
            .bind(event.aggregate_id)
            .bind(&event.aggregate_type)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.version)
            .bind(&event.correlation_id)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                if is_unique_violation(&e) {
                    drop(tx);
                    let actual = self.current_version(aggregate_id).await?;
                    warn!(%aggregate_id, expected_version, actual, "lost append race");
                    return Err(DomainError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(map_sqlx(e));
            }
        }

        enqueue(&mut *tx, EVENTS_QUEUE, outbox)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;

        debug!(%aggregate_id, expected_version, "events appended");
        Ok(())
    }
}
