//! Integration tests for `PgEventRepository`.

use chrono::{DateTime, TimeZone, Utc};
use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::repository::{EventRepository, StoredEvent};
use conference_core::transport::{EVENTS_QUEUE, MessageQueue};
use conference_store::pg_event_repository::PgEventRepository;
use conference_store::pg_message_queue::PgMessageQueue;
use sqlx::PgPool;
use uuid::Uuid;

fn occurred_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// Helper to build a `StoredEvent` with sensible defaults.
fn make_stored_event(aggregate_id: Uuid, version: i64) -> StoredEvent {
    StoredEvent {
        event_id: Uuid::new_v4(),
        aggregate_id,
        aggregate_type: "order".to_string(),
        event_type: "orders.placed".to_string(),
        payload: serde_json::json!({"seats": version}),
        version,
        correlation_id: Some("corr-1".to_string()),
        occurred_at: occurred_at(),
    }
}

fn outbox_message(body: &str) -> Message {
    Message::new(body)
}

async fn queued_bodies(pool: &PgPool) -> Vec<String> {
    sqlx::query_scalar("SELECT body FROM messages WHERE queue = $1 ORDER BY id")
        .bind(EVENTS_QUEUE)
        .fetch_all(pool)
        .await
        .unwrap()
}

// --- load_events ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_load_events_returns_empty_vec_for_nonexistent_aggregate(pool: PgPool) {
    let repo = PgEventRepository::new(pool);

    let events = repo.load_events(Uuid::new_v4()).await.unwrap();

    assert!(events.is_empty());
}

// --- append_events + load_events round-trip ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_and_load_preserves_every_field(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let event = make_stored_event(aggregate_id, 0);

    // Act
    repo.append_events(aggregate_id, -1, std::slice::from_ref(&event), &[])
        .await
        .unwrap();

    // Assert
    let loaded = repo.load_events(aggregate_id).await.unwrap();
    assert_eq!(loaded, vec![event]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_multiple_events_preserves_version_order(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let first = vec![make_stored_event(aggregate_id, 0), make_stored_event(aggregate_id, 1)];
    let second = vec![make_stored_event(aggregate_id, 2)];

    repo.append_events(aggregate_id, -1, &first, &[]).await.unwrap();
    repo.append_events(aggregate_id, 1, &second, &[]).await.unwrap();

    let versions: Vec<i64> = repo
        .load_events(aggregate_id)
        .await
        .unwrap()
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, vec![0, 1, 2]);
}

// --- optimistic concurrency ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_with_stale_expected_version_conflicts(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool.clone());
    let aggregate_id = Uuid::new_v4();
    repo.append_events(aggregate_id, -1, &[make_stored_event(aggregate_id, 0)], &[])
        .await
        .unwrap();

    // Act
    let result = repo
        .append_events(
            aggregate_id,
            -1,
            &[make_stored_event(aggregate_id, 0)],
            &[outbox_message("lost")],
        )
        .await;

    // Assert
    match result {
        Err(DomainError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, -1);
            assert_eq!(actual, 0);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 1);
    assert!(queued_bodies(&pool).await.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_appends_admit_exactly_one_writer(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();
    let a = [make_stored_event(aggregate_id, 0)];
    let b = [make_stored_event(aggregate_id, 0)];

    // Act
    let (left, right) = tokio::join!(
        repo.append_events(aggregate_id, -1, &a, &[]),
        repo.append_events(aggregate_id, -1, &b, &[]),
    );

    // Assert
    let outcomes = [left, right];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(DomainError::ConcurrencyConflict { .. })
    )));
    assert_eq!(repo.load_events(aggregate_id).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_with_version_gap_is_rejected(pool: PgPool) {
    let repo = PgEventRepository::new(pool);
    let aggregate_id = Uuid::new_v4();

    let result = repo
        .append_events(
            aggregate_id,
            -1,
            &[make_stored_event(aggregate_id, 0), make_stored_event(aggregate_id, 2)],
            &[],
        )
        .await;

    assert!(matches!(result, Err(DomainError::ConcurrencyConflict { .. })));
    assert!(repo.load_events(aggregate_id).await.unwrap().is_empty());
}

// --- outbox ---

#[sqlx::test(migrations = "../../migrations")]
async fn test_append_enqueues_outbox_in_same_transaction(pool: PgPool) {
    // Arrange
    let repo = PgEventRepository::new(pool.clone());
    let aggregate_id = Uuid::new_v4();

    // Act
    repo.append_events(
        aggregate_id,
        -1,
        &[make_stored_event(aggregate_id, 0)],
        &[outbox_message("first"), outbox_message("second")],
    )
    .await
    .unwrap();

    // Assert
    assert_eq!(queued_bodies(&pool).await, vec!["first", "second"]);
    let queue = PgMessageQueue::new(pool, EVENTS_QUEUE, chrono::TimeDelta::seconds(30));
    let claimed = queue.claim(Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.message.body, "first");
}
