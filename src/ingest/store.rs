use async_trait::async_trait;

use crate::storage::{Database, DatabaseError, Item, ParsedItem, Source};

/// Persistence operations the ingestion pipeline needs.
///
/// `save_item` must report an existing (guid, source_id) pair as
/// [`DatabaseError::DuplicateItem`] so the dedupe gate can absorb races.
#[async_trait]
pub trait NewsStore: Send + Sync {
    async fn find_source_by_id(&self, id: i64) -> Result<Option<Source>, DatabaseError>;

    /// Active sources ordered by name.
    async fn find_active_sources(&self) -> Result<Vec<Source>, DatabaseError>;

    async fn find_item_by_guid_and_source(
        &self,
        guid: &str,
        source_id: i64,
    ) -> Result<Option<Item>, DatabaseError>;

    async fn save_item(&self, source_id: i64, item: &ParsedItem) -> Result<Item, DatabaseError>;

    async fn save_source(&self, source: &Source) -> Result<(), DatabaseError>;
}

#[async_trait]
impl NewsStore for Database {
    async fn find_source_by_id(&self, id: i64) -> Result<Option<Source>, DatabaseError> {
        Database::find_source_by_id(self, id).await
    }

    async fn find_active_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        Database::find_active_sources(self).await
    }

    async fn find_item_by_guid_and_source(
        &self,
        guid: &str,
        source_id: i64,
    ) -> Result<Option<Item>, DatabaseError> {
        Database::find_item_by_guid_and_source(self, guid, source_id).await
    }

    async fn save_item(&self, source_id: i64, item: &ParsedItem) -> Result<Item, DatabaseError> {
        Database::save_item(self, source_id, item).await
    }

    async fn save_source(&self, source: &Source) -> Result<(), DatabaseError> {
        Database::save_source(self, source).await
    }
}
