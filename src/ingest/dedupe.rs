use super::store::NewsStore;
use crate::storage::{DatabaseError, Item, ParsedItem};

/// What happened to a candidate at the dedupe gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// New item, now persisted
    Inserted(Item),
    /// (guid, source_id) already stored; nothing written
    Duplicate,
}

/// Check-then-insert guard keyed on (guid, source_id).
///
/// The pre-check avoids needless inserts; the store's uniqueness constraint
/// catches the window between check and insert when two ingestions of one
/// source overlap.
pub struct DedupeGate<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: NewsStore + ?Sized> DedupeGate<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn exists(&self, guid: &str, source_id: i64) -> Result<bool, DatabaseError> {
        Ok(self
            .store
            .find_item_by_guid_and_source(guid, source_id)
            .await?
            .is_some())
    }

    /// Persist `item` unless it is already known.
    ///
    /// # Errors
    ///
    /// Only storage failures other than a uniqueness violation.
    pub async fn admit(
        &self,
        source_id: i64,
        item: &ParsedItem,
    ) -> Result<Admission, DatabaseError> {
        if self.exists(&item.guid, source_id).await? {
            tracing::trace!(source_id, guid = %item.guid, "Item already stored");
            return Ok(Admission::Duplicate);
        }

        match self.store.save_item(source_id, item).await {
            Ok(saved) => Ok(Admission::Inserted(saved)),
            Err(DatabaseError::DuplicateItem { guid, source_id }) => {
                tracing::info!(
                    source_id,
                    guid = %guid,
                    "Item inserted concurrently by another ingestion, skipping"
                );
                Ok(Admission::Duplicate)
            }
            Err(e) => Err(e),
        }
    }
}
