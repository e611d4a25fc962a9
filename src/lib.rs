//! News ingestion for RSS and Atom sources.
//!
//! Sources live in a SQLite database. Each ingestion fetches a source's feed,
//! normalizes its items and stores the ones not seen before, keyed by
//! (guid, source). Runs are either inline batches or queued messages picked
//! up by workers.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
pub mod util;
