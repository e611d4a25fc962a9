//! Source ingestion: the per-source pipeline and the ways to run it.
//!
//! - [`Ingestor::ingest`] fetches one source, stores its new items and marks
//!   it parsed
//! - [`Ingestor::run_batch`] runs several sources in sequence and aggregates
//!   the outcome
//! - [`dispatch_all`] queues one message per source; a [`Worker`] drains the
//!   queue in another process
//!
//! Persistence and dispatch are reached through the [`NewsStore`] and
//! [`Dispatcher`] traits, both implemented by [`Database`](crate::storage::Database).

mod batch;
mod dedupe;
mod dispatch;
mod error;
mod orchestrator;
mod store;
mod worker;

pub use batch::{dispatch_all, select_sources, BatchReport, SelectError, SourceOutcome};
pub use dedupe::{Admission, DedupeGate};
pub use dispatch::{DispatchError, Dispatcher, IngestMessage, INGEST_QUEUE};
pub use error::IngestError;
pub use orchestrator::Ingestor;
pub use store::NewsStore;
pub use worker::{handle_message, MessageOutcome, Worker};
