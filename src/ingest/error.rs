use thiserror::Error;

use crate::feed::{FetchError, ParseError};
use crate::storage::DatabaseError;

/// Reasons a whole source ingestion fails.
///
/// Item-level problems never surface here; they are logged and skipped
/// inside the per-item loop.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The source has no usable URL
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network, timeout or HTTP status failure while fetching
    #[error("Transport error: {0}")]
    Transport(FetchError),

    /// The server answered 2xx with no body
    #[error("Feed returned an empty response")]
    EmptyResponse,

    /// The body is not well-formed XML
    #[error("Malformed feed: {0}")]
    MalformedFeed(#[from] ParseError),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(e) => IngestError::InvalidInput(e.to_string()),
            other => IngestError::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::UrlValidationError;

    #[test]
    fn test_invalid_url_becomes_invalid_input() {
        let err: IngestError = FetchError::InvalidUrl(UrlValidationError::Empty).into();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[test]
    fn test_transport_errors_wrapped() {
        let err: IngestError = FetchError::Timeout.into();
        assert!(matches!(err, IngestError::Transport(FetchError::Timeout)));
        assert_eq!(err.to_string(), "Transport error: Request timed out");

        let err: IngestError = FetchError::HttpStatus(503).into();
        assert!(matches!(err, IngestError::Transport(FetchError::HttpStatus(503))));
    }
}
