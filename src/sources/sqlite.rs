//! Durable request source backed by SQLite.
//!
//! Mirrors cloud storage-queue semantics: a received message becomes
//! invisible for a visibility timeout and is re-delivered unless deleted
//! with the matching pop receipt, giving at-least-once delivery across
//! restarts and multiple consumers. All step queues share one table,
//! multiplexed by queue name.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

use crate::request::VectorizationRequest;

use super::{ReceivedRequest, RequestSource, SourceError};

/// Default time a received message stays invisible before re-delivery.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed [`RequestSource`].
#[derive(Clone)]
pub struct SqliteRequestSource {
    name: String,
    pool: SqlitePool,
    visibility_timeout: Duration,
}

impl SqliteRequestSource {
    /// Creates a source over an existing pool. The pool is shared by every
    /// step queue of a deployment.
    #[must_use]
    pub fn new(name: impl Into<String>, pool: SqlitePool, visibility_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            pool,
            visibility_timeout,
        }
    }

    fn backend_error(&self, e: impl std::fmt::Display) -> SourceError {
        SourceError::Backend {
            source_name: self.name.clone(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl RequestSource for SqliteRequestSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn has_requests(&self) -> Result<bool, SourceError> {
        let row = sqlx::query(
            "SELECT EXISTS(
                 SELECT 1 FROM queue_messages
                 WHERE queue_name = ? AND visible_at <= ?)",
        )
        .bind(&self.name)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.backend_error(e))?;
        let exists: i64 = row.get(0);
        Ok(exists != 0)
    }

    #[instrument(skip(self), fields(source = %self.name), err)]
    async fn receive_requests(&self, count: usize) -> Result<Vec<ReceivedRequest>, SourceError> {
        let now = Utc::now().timestamp_millis();
        let invisible_until = now
            + i64::try_from(self.visibility_timeout.as_millis()).unwrap_or(i64::MAX);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.backend_error(e))?;

        let rows = sqlx::query(
            "SELECT id, message_id, body, dequeue_count FROM queue_messages
             WHERE queue_name = ? AND visible_at <= ?
             ORDER BY id
             LIMIT ?",
        )
        .bind(&self.name)
        .bind(now)
        .bind(count as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| self.backend_error(e))?;

        let mut received = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let message_id: String = row.get("message_id");
            let body: String = row.get("body");
            let dequeue_count: i64 = row.get("dequeue_count");
            let pop_receipt = Uuid::new_v4().to_string();

            sqlx::query(
                "UPDATE queue_messages
                 SET pop_receipt = ?, visible_at = ?, dequeue_count = dequeue_count + 1
                 WHERE id = ?",
            )
            .bind(&pop_receipt)
            .bind(invisible_until)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.backend_error(e))?;

            let request: VectorizationRequest = serde_json::from_str(&body)?;
            received.push(ReceivedRequest {
                request,
                message_id,
                pop_receipt,
                dequeue_count: u32::try_from(dequeue_count + 1).unwrap_or(u32::MAX),
            });
        }

        tx.commit().await.map_err(|e| self.backend_error(e))?;
        Ok(received)
    }

    async fn delete_request(
        &self,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), SourceError> {
        // Matching on the pop receipt makes the delete a no-op when the
        // message was re-delivered to another consumer in the meantime.
        sqlx::query(
            "DELETE FROM queue_messages
             WHERE queue_name = ? AND message_id = ? AND pop_receipt = ?",
        )
        .bind(&self.name)
        .bind(message_id)
        .bind(pop_receipt)
        .execute(&self.pool)
        .await
        .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(source = %self.name, request = %request.name), err)]
    async fn submit_request(&self, request: &VectorizationRequest) -> Result<(), SourceError> {
        let body = serde_json::to_string(request)?;
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            "INSERT INTO queue_messages
                 (queue_name, message_id, pop_receipt, body, dequeue_count, visible_at, created_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&self.name)
        .bind(Uuid::new_v4().to_string())
        .bind(Uuid::new_v4().to_string())
        .bind(&body)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| self.backend_error(e))?;
        Ok(())
    }

    async fn update_request(
        &self,
        message_id: &str,
        pop_receipt: &str,
        request: &VectorizationRequest,
    ) -> Result<String, SourceError> {
        let body = serde_json::to_string(request)?;
        let new_receipt = Uuid::new_v4().to_string();
        sqlx::query(
            "UPDATE queue_messages
             SET body = ?, pop_receipt = ?, visible_at = ?
             WHERE queue_name = ? AND message_id = ? AND pop_receipt = ?",
        )
        .bind(&body)
        .bind(&new_receipt)
        .bind(Utc::now().timestamp_millis())
        .bind(&self.name)
        .bind(message_id)
        .bind(pop_receipt)
        .execute(&self.pool)
        .await
        .map_err(|e| self.backend_error(e))?;
        Ok(new_receipt)
    }
}
