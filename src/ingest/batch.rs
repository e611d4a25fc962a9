use thiserror::Error;

use super::dispatch::{DispatchError, Dispatcher, IngestMessage};
use super::error::IngestError;
use super::orchestrator::Ingestor;
use super::store::NewsStore;
use crate::storage::{DatabaseError, Source};

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Source {0} not found")]
    SourceNotFound(i64),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Sources for one run: the source with `source_id` whatever its activity
/// flag, or every active source ordered by name.
pub async fn select_sources<S: NewsStore + ?Sized>(
    store: &S,
    source_id: Option<i64>,
) -> Result<Vec<Source>, SelectError> {
    match source_id {
        Some(id) => store
            .find_source_by_id(id)
            .await?
            .map(|source| vec![source])
            .ok_or(SelectError::SourceNotFound(id)),
        None => Ok(store.find_active_sources().await?),
    }
}

/// Result of ingesting one source within a batch.
#[derive(Debug)]
pub struct SourceOutcome {
    pub source_id: i64,
    pub name: String,
    pub result: Result<usize, IngestError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
    pub total_items: usize,
    pub outcomes: Vec<SourceOutcome>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, source: &Source, result: Result<usize, IngestError>) {
        match result {
            Ok(count) => {
                self.succeeded += 1;
                self.total_items += count;
            }
            Err(_) => self.failed += 1,
        }
        self.outcomes.push(SourceOutcome {
            source_id: source.id,
            name: source.name.clone(),
            result,
        });
    }
}

impl<S: NewsStore> Ingestor<S> {
    /// Ingest `sources` one after another.
    ///
    /// A failing source is recorded and the run moves on to the next one.
    pub async fn run_batch(&self, sources: Vec<Source>) -> BatchReport {
        let mut report = BatchReport::default();

        for mut source in sources {
            let result = self.ingest(&mut source).await;
            report.record(&source, result);
        }

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            total_items = report.total_items,
            "Batch ingestion finished"
        );
        report
    }
}

/// Queue one ingest message per source. Returns how many were queued.
pub async fn dispatch_all<D: Dispatcher + ?Sized>(
    dispatcher: &D,
    sources: &[Source],
) -> Result<usize, DispatchError> {
    for source in sources {
        dispatcher.dispatch(IngestMessage::new(source.id)).await?;
    }
    tracing::info!(dispatched = sources.len(), "Ingest messages dispatched");
    Ok(sources.len())
}
