use super::schema::Database;
use super::types::{DatabaseError, Item, ParsedItem};

const ITEM_COLUMNS: &str = "id, source_id, title, description, content, link, image_url, guid, \
                            published_at, created_at, updated_at";

/// Maximum number of items returned by a listing query (OOM protection)
const MAX_ITEMS: i64 = 2000;

impl Database {
    // ========================================================================
    // Item Operations
    // ========================================================================

    /// Exact-match lookup on the (guid, source_id) identity.
    pub async fn find_item_by_guid_and_source(
        &self,
        guid: &str,
        source_id: i64,
    ) -> Result<Option<Item>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM items WHERE guid = ? AND source_id = ?",
            ITEM_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(guid)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Insert one item in its own autocommit statement.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::DuplicateItem` if the (guid, source_id) pair is
    /// already stored, including when a concurrent writer got there first.
    pub async fn save_item(
        &self,
        source_id: i64,
        item: &ParsedItem,
    ) -> Result<Item, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO items \
             (source_id, title, description, content, link, image_url, guid, published_at, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            ITEM_COLUMNS
        );

        sqlx::query_as(&sql)
            .bind(source_id)
            .bind(&item.title)
            .bind(&item.description)
            .bind(&item.content)
            .bind(&item.link)
            .bind(&item.image_url)
            .bind(&item.guid)
            .bind(item.published_at)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    DatabaseError::DuplicateItem {
                        guid: item.guid.clone(),
                        source_id,
                    }
                }
                other => DatabaseError::from_sqlx(other),
            })
    }

    /// Items of one source, newest first.
    pub async fn get_items_for_source(&self, source_id: i64) -> Result<Vec<Item>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM items WHERE source_id = ? ORDER BY published_at DESC, id DESC LIMIT ?",
            ITEM_COLUMNS
        );
        sqlx::query_as(&sql)
            .bind(source_id)
            .bind(MAX_ITEMS)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    pub async fn count_items_for_source(&self, source_id: i64) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(count)
    }
}
