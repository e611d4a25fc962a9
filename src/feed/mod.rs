//! Feed retrieval and interpretation for RSS and Atom sources.
//!
//! - **Fetching**: one HTTP GET per source with a fixed user-agent and timeout
//! - **Parsing**: turn feed bytes into raw `<item>` / `<entry>` nodes
//! - **Normalizing**: map a raw node onto a [`ParsedItem`](crate::storage::ParsedItem)
//!
//! # Architecture
//!
//! - [`document`] - owned element tree over quick-xml events
//! - [`parser`] - item/entry selection
//! - [`normalizer`] - ordered per-field fallbacks and date handling
//! - [`fetcher`] - HTTP retrieval with size and redirect limits
//!
//! # Example
//!
//! ```ignore
//! use newsparser::feed::{normalize, now_timestamp, parse_feed, FeedFetcher};
//!
//! let bytes = fetcher.fetch(&source.url).await?;
//! let now = now_timestamp();
//! for raw in parse_feed(&bytes)? {
//!     if let Some(item) = normalize(&raw, now) {
//!         // hand to the dedupe gate
//!     }
//! }
//! ```

pub mod document;
mod fetcher;
pub mod normalizer;
mod parser;

pub use document::{Document, Element, ParseError};
pub use fetcher::{FeedFetcher, FetchError};
pub use normalizer::{normalize, now_timestamp, parse_date, Locator};
pub use parser::{parse_feed, RawItem, RawItems};
