use conference_core::message::Message;
use sqlx::PgConnection;

/// Inserts `messages` into `queue` on the caller's connection, so they commit
/// or roll back with whatever else the caller's transaction writes.
pub(crate) async fn enqueue(
    conn: &mut PgConnection,
    queue: &str,
    messages: &[Message],
) -> Result<(), sqlx::Error> {
    for message in messages {
        sqlx::query(
            r"
            INSERT INTO messages (queue, body, delivery_date, expiration_date, correlation_id, message_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(queue)
        .bind(&message.body)
        .bind(message.delivery_date)
        .bind(message.expiration_date)
        .bind(&message.correlation_id)
        .bind(&message.message_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
