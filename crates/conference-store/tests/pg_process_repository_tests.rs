//! Integration tests for `PgProcessRepository`.

use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::process_manager::{ProcessRecord, ProcessStateRepository};
use conference_store::pg_process_repository::PgProcessRepository;
use sqlx::PgPool;
use uuid::Uuid;

fn record(id: Uuid, version: i64, step: &str) -> ProcessRecord {
    ProcessRecord {
        id,
        process_type: "registration".to_string(),
        version,
        completed: false,
        state: serde_json::json!({ "step": step }),
    }
}

async fn command_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE queue = 'commands'")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_unknown_process_returns_none(pool: PgPool) {
    let repo = PgProcessRepository::new(pool);

    let loaded = repo.load("registration", Uuid::new_v4()).await.unwrap();

    assert!(loaded.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_save_then_load_round_trips_and_dispatches(pool: PgPool) {
    // Arrange
    let repo = PgProcessRepository::new(pool.clone());
    let id = Uuid::new_v4();

    // Act
    repo.save(&record(id, 0, "reserving"), -1, &[Message::new("make reservation")])
        .await
        .unwrap();
    let mut next = record(id, 1, "paying");
    next.completed = true;
    repo.save(&next, 0, &[]).await.unwrap();

    // Assert
    let loaded = repo.load("registration", id).await.unwrap().unwrap();
    assert_eq!(loaded, next);
    assert_eq!(command_count(&pool).await, 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_insert_conflicts(pool: PgPool) {
    let repo = PgProcessRepository::new(pool.clone());
    let id = Uuid::new_v4();
    repo.save(&record(id, 0, "a"), -1, &[]).await.unwrap();

    let result = repo
        .save(&record(id, 0, "b"), -1, &[Message::new("dropped")])
        .await;

    match result {
        Err(DomainError::ConcurrencyConflict { expected, actual, .. }) => {
            assert_eq!(expected, -1);
            assert_eq!(actual, 0);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(command_count(&pool).await, 0);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_stale_update_conflicts_and_keeps_state(pool: PgPool) {
    let repo = PgProcessRepository::new(pool);
    let id = Uuid::new_v4();
    repo.save(&record(id, 0, "a"), -1, &[]).await.unwrap();
    repo.save(&record(id, 1, "b"), 0, &[]).await.unwrap();

    let result = repo.save(&record(id, 1, "stale"), 0, &[]).await;

    assert!(matches!(result, Err(DomainError::ConcurrencyConflict { .. })));
    let loaded = repo.load("registration", id).await.unwrap().unwrap();
    assert_eq!(loaded.state["step"], "b");
}
