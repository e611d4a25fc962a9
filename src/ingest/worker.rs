use std::time::Duration;
use tokio::sync::watch;

use super::dispatch::{IngestMessage, INGEST_QUEUE};
use super::orchestrator::Ingestor;
use super::store::NewsStore;
use crate::config::Config;
use crate::storage::{Database, DatabaseError, QueuedMessage};

/// How one queue message was handled. Every outcome acknowledges the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Ingested(usize),
    SkippedInactive,
    UnknownSource,
    Failed,
    /// Body was not a valid ingest message
    Rejected,
}

/// Handle one "ingest source N" message.
///
/// Unknown sources and ingestion failures are logged as errors; inactive
/// sources are skipped.
pub async fn handle_message<S: NewsStore>(
    ingestor: &Ingestor<S>,
    message: IngestMessage,
) -> MessageOutcome {
    let source_id = message.source_id;
    let mut source = match ingestor.store().find_source_by_id(source_id).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            tracing::error!(source_id, "Source not found, dropping message");
            return MessageOutcome::UnknownSource;
        }
        Err(e) => {
            tracing::error!(source_id, error = %e, "Failed to load source");
            return MessageOutcome::Failed;
        }
    };

    if !source.is_active {
        tracing::info!(source_id, source = %source.name, "Source is inactive, skipping");
        return MessageOutcome::SkippedInactive;
    }

    match ingestor.ingest(&mut source).await {
        Ok(count) => MessageOutcome::Ingested(count),
        // Already logged by the ingestor
        Err(_) => MessageOutcome::Failed,
    }
}

/// Drains the ingest queue.
pub struct Worker<S> {
    ingestor: Ingestor<S>,
    queue: Database,
    poll_interval: Duration,
    visibility: Duration,
}

impl<S: NewsStore> Worker<S> {
    pub fn new(ingestor: Ingestor<S>, queue: Database, config: &Config) -> Self {
        Self {
            ingestor,
            queue,
            poll_interval: config.worker_poll_interval(),
            visibility: config.worker_redeliver_after(),
        }
    }

    /// Claim, handle and acknowledge the next message, if any.
    ///
    /// A worker that stops between claim and acknowledge leaves the message
    /// to be redelivered after the visibility window.
    pub async fn process_next(&self) -> Result<Option<MessageOutcome>, DatabaseError> {
        let Some(claimed) = self.queue.claim_message(INGEST_QUEUE, self.visibility).await? else {
            return Ok(None);
        };

        let outcome = self.handle_claimed(&claimed).await;
        self.queue.ack_message(claimed.id).await?;
        Ok(Some(outcome))
    }

    async fn handle_claimed(&self, claimed: &QueuedMessage) -> MessageOutcome {
        let message: IngestMessage = match serde_json::from_str(&claimed.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(
                    message_id = claimed.id,
                    body = %claimed.body,
                    error = %e,
                    "Malformed queue message, dropping"
                );
                return MessageOutcome::Rejected;
            }
        };

        if claimed.attempts > 1 {
            tracing::info!(
                message_id = claimed.id,
                source_id = message.source_id,
                attempts = claimed.attempts,
                "Redelivered message"
            );
        }
        handle_message(&self.ingestor, message).await
    }

    /// Process messages until the queue is empty. Returns how many were handled.
    pub async fn run_until_empty(&self) -> Result<usize, DatabaseError> {
        let mut handled = 0;
        while self.process_next().await?.is_some() {
            handled += 1;
        }
        tracing::info!(handled, "Queue drained");
        Ok(handled)
    }

    /// Process messages until `cancel` turns true, sleeping while idle.
    ///
    /// Cancellation is only observed between messages; an ingestion in
    /// progress always finishes. Queue errors are logged and retried after
    /// the poll interval.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) -> usize {
        let mut handled = 0;
        tracing::info!(queue = INGEST_QUEUE, "Worker started");

        while !*cancel.borrow() {
            match self.process_next().await {
                Ok(Some(_)) => {
                    handled += 1;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(queue = INGEST_QUEUE, error = %e, "Queue unavailable, retrying");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = cancel.changed() => {
                    // Sender gone: nobody can cancel any more, keep polling.
                    if changed.is_err() {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        tracing::info!(handled, "Worker stopped");
        handled
    }
}
