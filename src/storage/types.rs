use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Database is locked by another process. Retry once it finishes.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The (guid, source_id) pair is already stored
    #[error("Item {guid:?} already exists for source {source_id}")]
    DuplicateItem { guid: String, source_id: i64 },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::Locked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Default `country` for new sources.
pub const DEFAULT_COUNTRY: &str = "rus";

/// A configured news feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub country: String,
    pub created_at: i64,
    pub last_parsed_at: Option<i64>,
    pub updated_at: Option<i64>,
}

/// Fields for registering a source. `id` and timestamps are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub country: String,
}

impl NewSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: None,
            is_active: true,
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

/// A normalized news item that has not been stored yet.
///
/// `guid` and `title` are always non-empty; normalization drops candidates
/// that lack either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    /// Unix seconds
    pub published_at: i64,
}

/// A stored news item.
///
/// Items are written once; re-ingestion never updates them.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub guid: String,
    pub published_at: i64,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// A queue message claimed by a worker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedMessage {
    pub id: i64,
    pub queue_name: String,
    pub body: String,
    pub attempts: i64,
}
