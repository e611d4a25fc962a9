use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{Database, DatabaseError};

/// Queue carrying [`IngestMessage`]s.
pub const INGEST_QUEUE: &str = "rss_parse";

/// "Ingest source N", as carried on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestMessage {
    pub source_id: i64,
}

impl IngestMessage {
    pub fn new(source_id: i64) -> Self {
        Self { source_id }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to enqueue message: {0}")]
    Storage(#[from] DatabaseError),
}

/// Hands ingestion work to asynchronous consumers.
///
/// Delivery is at-least-once, so a consumer may see the same message twice.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: IngestMessage) -> Result<(), DispatchError>;
}

#[async_trait]
impl Dispatcher for Database {
    async fn dispatch(&self, message: IngestMessage) -> Result<(), DispatchError> {
        let body = serde_json::to_string(&message)?;
        let id = self.enqueue_message(INGEST_QUEUE, &body).await?;
        tracing::debug!(message_id = id, source_id = message.source_id, "Ingest message queued");
        Ok(())
    }
}
