//! `PostgreSQL` message queue.
//!
//! All queues share the `messages` table, partitioned by the `queue` column.
//! A claim takes a time-bounded lease on one row (`locked_until`); concurrent
//! claimers skip locked rows, so each row goes to exactly one consumer until
//! its lease lapses.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, warn};

use conference_core::error::DomainError;
use conference_core::message::{Message, ReceivedMessage};
use conference_core::transport::{MessageQueue, MessageSender};

use crate::error::map_sqlx;
use crate::outbox::enqueue;

/// Enqueues messages onto one named queue.
#[derive(Debug, Clone)]
pub struct PgMessageSender {
    pool: PgPool,
    queue: String,
}

impl PgMessageSender {
    /// Creates a sender writing to `queue`.
    #[must_use]
    pub fn new(pool: PgPool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    /// Enqueues `messages` on the caller's connection, typically an open
    /// transaction, so they commit or roll back with the caller's own writes.
    ///
    /// # Errors
    ///
    /// Returns `TransportUnavailable` or `Infrastructure` if the insert fails.
    pub async fn send_in(
        &self,
        conn: &mut PgConnection,
        messages: &[Message],
    ) -> Result<(), DomainError> {
        enqueue(conn, &self.queue, messages)
            .await
            .map_err(map_sqlx)?;
        debug!(queue = %self.queue, count = messages.len(), "messages enlisted");
        Ok(())
    }
}

#[async_trait]
impl MessageSender for PgMessageSender {
    async fn send(&self, messages: Vec<Message>) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        enqueue(&mut *tx, &self.queue, &messages)
            .await
            .map_err(map_sqlx)?;
        tx.commit().await.map_err(map_sqlx)?;
        debug!(queue = %self.queue, count = messages.len(), "messages enqueued");
        Ok(())
    }
}

/// Consumes one named queue.
#[derive(Debug, Clone)]
pub struct PgMessageQueue {
    pool: PgPool,
    queue: String,
    lease: TimeDelta,
}

impl PgMessageQueue {
    /// Creates a consumer of `queue` whose claims last `lease`.
    #[must_use]
    pub fn new(pool: PgPool, queue: impl Into<String>, lease: TimeDelta) -> Self {
        Self {
            pool,
            queue: queue.into(),
            lease,
        }
    }

    fn received(&self, row: &PgRow) -> Result<ReceivedMessage, sqlx::Error> {
        Ok(ReceivedMessage {
            id: row.try_get("id")?,
            queue: self.queue.clone(),
            delivery_count: row.try_get("delivery_count")?,
            message: Message {
                body: row.try_get("body")?,
                delivery_date: row.try_get("delivery_date")?,
                expiration_date: row.try_get("expiration_date")?,
                correlation_id: row.try_get("correlation_id")?,
                message_id: row.try_get("message_id")?,
            },
        })
    }
}

#[async_trait]
impl MessageQueue for PgMessageQueue {
    fn name(&self) -> &str {
        &self.queue
    }

    async fn claim(&self, now: DateTime<Utc>) -> Result<Option<ReceivedMessage>, DomainError> {
        let row = sqlx::query(
            r"
            UPDATE messages
            SET locked_until = $3, delivery_count = delivery_count + 1
            WHERE id = (
                SELECT id FROM messages
                WHERE queue = $1
                  AND dead_lettered_at IS NULL
                  AND (delivery_date IS NULL OR delivery_date <= $2)
                  AND (locked_until IS NULL OR locked_until <= $2)
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, body, delivery_date, expiration_date, correlation_id,
                      message_id, delivery_count
            ",
        )
        .bind(&self.queue)
        .bind(now)
        .bind(now + self.lease)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|row| self.received(&row))
            .transpose()
            .map_err(map_sqlx)
    }

    async fn complete(&self, id: i64) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn abandon(&self, id: i64) -> Result<(), DomainError> {
        sqlx::query("UPDATE messages SET locked_until = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), DomainError> {
        sqlx::query(
            r"
            UPDATE messages
            SET dead_lettered_at = NOW(), locked_until = NULL, last_error = $2
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        warn!(queue = %self.queue, id, reason, "message moved to dead letters");
        Ok(())
    }
}
