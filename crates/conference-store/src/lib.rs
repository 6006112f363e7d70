//! `PostgreSQL` persistence for the conference system.
//!
//! Every write that produces messages (event appends, process-state saves)
//! inserts them into the `messages` table inside the same transaction.

mod error;
mod outbox;
pub mod pg_event_repository;
pub mod pg_message_queue;
pub mod pg_process_repository;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");
