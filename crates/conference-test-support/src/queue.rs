//! In-memory transport: a `MessageSender` + `MessageQueue` pair backed by a
//! mutex-guarded vector. Mirrors the lease semantics of the Postgres queue.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use conference_core::error::DomainError;
use conference_core::message::{Message, ReceivedMessage};
use conference_core::transport::{MessageQueue, MessageSender};

#[derive(Debug, Clone)]
struct Row {
    id: i64,
    message: Message,
    delivery_count: i32,
    locked_until: Option<DateTime<Utc>>,
    dead_letter_reason: Option<String>,
}

#[derive(Debug, Default)]
struct Rows {
    next_id: i64,
    rows: Vec<Row>,
}

/// A single named queue held in memory.
#[derive(Debug)]
pub struct InMemoryMessageQueue {
    name: String,
    lease: TimeDelta,
    rows: Mutex<Rows>,
}

impl InMemoryMessageQueue {
    /// Creates an empty queue whose claims last 30 seconds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_lease(name, TimeDelta::seconds(30))
    }

    /// Creates an empty queue with a custom claim lease.
    #[must_use]
    pub fn with_lease(name: impl Into<String>, lease: TimeDelta) -> Self {
        Self {
            name: name.into(),
            lease,
            rows: Mutex::new(Rows::default()),
        }
    }

    /// Appends messages directly; used by the in-memory repositories to
    /// write their outbox under their own lock.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn enqueue(&self, messages: &[Message]) {
        let mut rows = self.rows.lock().unwrap();
        for message in messages {
            rows.next_id += 1;
            let id = rows.next_id;
            rows.rows.push(Row {
                id,
                message: message.clone(),
                delivery_count: 0,
                locked_until: None,
                dead_letter_reason: None,
            });
        }
    }

    /// Messages still on the queue (claimed or not), excluding dead letters.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn messages(&self) -> Vec<Message> {
        self.rows
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|row| row.dead_letter_reason.is_none())
            .map(|row| row.message.clone())
            .collect()
    }

    /// Dead-lettered messages with the reason they were parked.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn dead_letters(&self) -> Vec<(Message, String)> {
        self.rows
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter_map(|row| {
                row.dead_letter_reason
                    .clone()
                    .map(|reason| (row.message.clone(), reason))
            })
            .collect()
    }

    /// Number of live messages on the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages().len()
    }

    /// Returns true if no live messages remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, id: i64, f: impl FnOnce(&mut Row)) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| DomainError::Infrastructure(format!("no message {id} on {}", self.name)))?;
        f(row);
        Ok(())
    }
}

#[async_trait]
impl MessageSender for InMemoryMessageQueue {
    async fn send(&self, messages: Vec<Message>) -> Result<(), DomainError> {
        self.enqueue(&messages);
        Ok(())
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn claim(&self, now: DateTime<Utc>) -> Result<Option<ReceivedMessage>, DomainError> {
        let mut rows = self.rows.lock().unwrap();
        let claimable = rows.rows.iter_mut().find(|row| {
            row.dead_letter_reason.is_none()
                && row.message.is_visible_at(now)
                && row.locked_until.is_none_or(|until| until <= now)
        });
        Ok(claimable.map(|row| {
            row.locked_until = Some(now + self.lease);
            row.delivery_count += 1;
            ReceivedMessage {
                id: row.id,
                queue: self.name.clone(),
                delivery_count: row.delivery_count,
                message: row.message.clone(),
            }
        }))
    }

    async fn complete(&self, id: i64) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().unwrap();
        rows.rows.retain(|row| row.id != id);
        Ok(())
    }

    async fn abandon(&self, id: i64) -> Result<(), DomainError> {
        self.update(id, |row| row.locked_until = None)
    }

    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), DomainError> {
        self.update(id, |row| {
            row.locked_until = None;
            row.dead_letter_reason = Some(reason.to_owned());
        })
    }
}
