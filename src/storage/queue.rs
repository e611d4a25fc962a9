//! Durable work queue on top of the `ingest_queue` table.
//!
//! Delivery is at-least-once. Claiming a message hides it for a visibility
//! window instead of removing it; only [`Database::ack_message`] deletes it.
//! A worker that dies mid-message leaves the row to reappear once the window
//! passes.

use std::time::Duration;

use super::schema::Database;
use super::types::{DatabaseError, QueuedMessage};

impl Database {
    // ========================================================================
    // Queue Operations
    // ========================================================================

    /// Append a message, immediately available. Returns the message id.
    pub async fn enqueue_message(&self, queue: &str, body: &str) -> Result<i64, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO ingest_queue (queue_name, body, created_at, available_at) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(queue)
        .bind(body)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(id)
    }

    /// Claim the oldest visible message on `queue`.
    ///
    /// The claim is a single UPDATE, so two workers never receive the same
    /// message within one visibility window.
    pub async fn claim_message(
        &self,
        queue: &str,
        visibility: Duration,
    ) -> Result<Option<QueuedMessage>, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let window = i64::try_from(visibility.as_secs()).unwrap_or(i64::MAX);
        let hidden_until = now.saturating_add(window);

        sqlx::query_as(
            r#"
            UPDATE ingest_queue
            SET delivered_at = ?, available_at = ?, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM ingest_queue
                WHERE queue_name = ? AND available_at <= ?
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, queue_name, body, attempts
        "#,
        )
        .bind(now)
        .bind(hidden_until)
        .bind(queue)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Remove a handled message. Acknowledging twice is a no-op.
    pub async fn ack_message(&self, id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM ingest_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    /// Messages on `queue` not yet acknowledged, visible or not.
    pub async fn pending_messages(&self, queue: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ingest_queue WHERE queue_name = ?")
                .bind(queue)
                .fetch_one(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(count)
    }
}
