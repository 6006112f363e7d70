//! Integration tests for `PgMessageSender` and `PgMessageQueue`.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use conference_core::message::Message;
use conference_core::transport::{COMMANDS_QUEUE, EVENTS_QUEUE, MessageQueue, MessageSender};
use conference_store::pg_message_queue::{PgMessageQueue, PgMessageSender};
use sqlx::PgPool;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

fn queue(pool: &PgPool) -> PgMessageQueue {
    PgMessageQueue::new(pool.clone(), COMMANDS_QUEUE, TimeDelta::seconds(60))
}

async fn send(pool: &PgPool, messages: Vec<Message>) {
    PgMessageSender::new(pool.clone(), COMMANDS_QUEUE)
        .send(messages)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_returns_none_on_empty_queue(pool: PgPool) {
    let claimed = queue(&pool).claim(now()).await.unwrap();

    assert!(claimed.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_claim_round_trips_message_metadata(pool: PgPool) {
    // Arrange
    let message = Message {
        body: r#"{"type":"x","payload":{}}"#.to_string(),
        delivery_date: Some(now() - TimeDelta::seconds(1)),
        expiration_date: Some(now() + TimeDelta::minutes(5)),
        correlation_id: Some("corr-7".to_string()),
        message_id: Some("msg-7".to_string()),
    };
    send(&pool, vec![message.clone()]).await;

    // Act
    let claimed = queue(&pool).claim(now()).await.unwrap().unwrap();

    // Assert
    assert_eq!(claimed.message, message);
    assert_eq!(claimed.delivery_count, 1);
    assert_eq!(claimed.queue, COMMANDS_QUEUE);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_delayed_message_is_invisible_until_delivery_date(pool: PgPool) {
    let mut message = Message::new("later");
    message.delivery_date = Some(now() + TimeDelta::minutes(10));
    send(&pool, vec![message]).await;
    let queue = queue(&pool);

    let early = queue.claim(now() + TimeDelta::minutes(9)).await.unwrap();
    let due = queue.claim(now() + TimeDelta::minutes(10)).await.unwrap();

    assert!(early.is_none());
    assert_eq!(due.unwrap().message.body, "later");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_concurrent_claims_never_share_a_message(pool: PgPool) {
    // Arrange
    send(&pool, vec![Message::new("only")]).await;
    let a = queue(&pool);
    let b = queue(&pool);

    // Act
    let (left, right) = tokio::join!(a.claim(now()), b.claim(now()));

    // Assert
    let claimed = [left.unwrap(), right.unwrap()];
    assert_eq!(claimed.iter().filter(|c| c.is_some()).count(), 1);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unsettled_claim_is_redelivered_after_lease(pool: PgPool) {
    send(&pool, vec![Message::new("retry me")]).await;
    let queue = queue(&pool);
    queue.claim(now()).await.unwrap().unwrap();

    let during = queue.claim(now() + TimeDelta::seconds(59)).await.unwrap();
    let after = queue.claim(now() + TimeDelta::seconds(60)).await.unwrap();

    assert!(during.is_none());
    assert_eq!(after.unwrap().delivery_count, 2);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_abandon_makes_message_claimable_again(pool: PgPool) {
    send(&pool, vec![Message::new("again")]).await;
    let queue = queue(&pool);
    let claimed = queue.claim(now()).await.unwrap().unwrap();

    queue.abandon(claimed.id).await.unwrap();

    assert!(queue.claim(now()).await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_complete_removes_message(pool: PgPool) {
    send(&pool, vec![Message::new("done")]).await;
    let queue = queue(&pool);
    let claimed = queue.claim(now()).await.unwrap().unwrap();

    queue.complete(claimed.id).await.unwrap();

    assert!(queue.claim(now() + TimeDelta::hours(1)).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_dead_letter_keeps_row_but_stops_delivery(pool: PgPool) {
    // Arrange
    send(&pool, vec![Message::new("poison")]).await;
    let queue = queue(&pool);
    let claimed = queue.claim(now()).await.unwrap().unwrap();

    // Act
    queue.dead_letter(claimed.id, "unknown type").await.unwrap();

    // Assert
    assert!(queue.claim(now() + TimeDelta::hours(1)).await.unwrap().is_none());
    let last_error: Option<String> =
        sqlx::query_scalar("SELECT last_error FROM messages WHERE id = $1")
            .bind(claimed.id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(last_error.as_deref(), Some("unknown type"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_queues_are_isolated(pool: PgPool) {
    PgMessageSender::new(pool.clone(), EVENTS_QUEUE)
        .send(vec![Message::new("event")])
        .await
        .unwrap();

    let claimed = queue(&pool).claim(now()).await.unwrap();

    assert!(claimed.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_send_in_rolls_back_with_callers_transaction(pool: PgPool) {
    // Arrange
    let sender = PgMessageSender::new(pool.clone(), COMMANDS_QUEUE);
    let mut tx = pool.begin().await.unwrap();

    // Act
    sender
        .send_in(&mut *tx, &[Message::new(r#"{"type":"x","payload":{}}"#)])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    // Assert
    assert!(queue(&pool).claim(now()).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_send_in_commits_with_callers_writes(pool: PgPool) {
    // Arrange
    let sender = PgMessageSender::new(pool.clone(), COMMANDS_QUEUE);
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("CREATE TABLE audit_log (entry TEXT NOT NULL)")
        .execute(&mut *tx)
        .await
        .unwrap();
    sqlx::query("INSERT INTO audit_log (entry) VALUES ('order accepted')")
        .execute(&mut *tx)
        .await
        .unwrap();

    // Act
    sender
        .send_in(&mut *tx, &[Message::new(r#"{"type":"x","payload":{}}"#)])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // Assert
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(entries, 1);
    assert!(queue(&pool).claim(now()).await.unwrap().is_some());
}
