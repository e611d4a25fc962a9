use super::schema::Database;
use super::types::{DatabaseError, NewSource, Source};

const SOURCE_COLUMNS: &str =
    "id, name, url, description, is_active, country, created_at, last_parsed_at, updated_at";

impl Database {
    // ========================================================================
    // Source Operations
    // ========================================================================

    /// Register a new source and return it with its assigned id.
    pub async fn insert_source(&self, source: &NewSource) -> Result<Source, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let sql = format!(
            "INSERT INTO sources (name, url, description, is_active, country, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING {}",
            SOURCE_COLUMNS
        );

        let created: Source = sqlx::query_as(&sql)
            .bind(&source.name)
            .bind(&source.url)
            .bind(&source.description)
            .bind(source.is_active)
            .bind(&source.country)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::info!(source_id = created.id, name = %created.name, url = %created.url, "Source registered");
        Ok(created)
    }

    /// Look up a source by id regardless of its activity flag.
    pub async fn find_source_by_id(&self, id: i64) -> Result<Option<Source>, DatabaseError> {
        let sql = format!("SELECT {} FROM sources WHERE id = ?", SOURCE_COLUMNS);
        sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// All active sources, ordered by name.
    pub async fn find_active_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM sources WHERE is_active = 1 ORDER BY name, id",
            SOURCE_COLUMNS
        );
        sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Every source, active or not, ordered by name.
    pub async fn list_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        let sql = format!("SELECT {} FROM sources ORDER BY name, id", SOURCE_COLUMNS);
        sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Write back every mutable column of an existing source.
    ///
    /// `created_at` is never rewritten. Saving a source whose row has been
    /// deleted returns `DatabaseError::Other(RowNotFound)`.
    pub async fn save_source(&self, source: &Source) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE sources
            SET name = ?, url = ?, description = ?, is_active = ?, country = ?,
                last_parsed_at = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.description)
        .bind(source.is_active)
        .bind(&source.country)
        .bind(source.last_parsed_at)
        .bind(source.updated_at)
        .bind(source.id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::Other(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, DatabaseError, NewSource, DEFAULT_COUNTRY};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_source_defaults() {
        let db = test_db().await;
        let source = db
            .insert_source(&NewSource::new("Lenta.ru", "https://lenta.ru/rss"))
            .await
            .unwrap();

        assert!(source.id > 0);
        assert_eq!(source.name, "Lenta.ru");
        assert!(source.is_active);
        assert_eq!(source.country, DEFAULT_COUNTRY);
        assert!(source.created_at > 0);
        assert_eq!(source.last_parsed_at, None);
        assert_eq!(source.updated_at, None);
    }

    #[tokio::test]
    async fn test_find_source_by_id() {
        let db = test_db().await;
        let created = db
            .insert_source(&NewSource::new("TASS", "https://tass.ru/rss/v2.xml"))
            .await
            .unwrap();

        let found = db.find_source_by_id(created.id).await.unwrap();
        assert_eq!(found, Some(created));

        assert_eq!(db.find_source_by_id(9999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_active_sources_ordered_by_name() {
        let db = test_db().await;
        db.insert_source(&NewSource::new("TASS", "https://tass.ru/rss/v2.xml"))
            .await
            .unwrap();
        db.insert_source(&NewSource::new("Lenta.ru", "https://lenta.ru/rss"))
            .await
            .unwrap();
        let mut inactive = NewSource::new("Government", "http://government.ru/all/rss/");
        inactive.is_active = false;
        db.insert_source(&inactive).await.unwrap();
        db.insert_source(&NewSource::new("RBC", "https://rssexport.rbc.ru/rbcnews/news/30/full.rss"))
            .await
            .unwrap();

        let names: Vec<String> = db
            .find_active_sources()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Lenta.ru", "RBC", "TASS"]);

        assert_eq!(db.list_sources().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_save_source_updates_timestamps() {
        let db = test_db().await;
        let mut source = db
            .insert_source(&NewSource::new("RIA", "https://ria.ru/export/rss2/archive/index.xml"))
            .await
            .unwrap();

        source.last_parsed_at = Some(1_760_338_800);
        source.updated_at = Some(1_760_338_800);
        source.is_active = false;
        db.save_source(&source).await.unwrap();

        let reloaded = db.find_source_by_id(source.id).await.unwrap().unwrap();
        assert_eq!(reloaded.last_parsed_at, Some(1_760_338_800));
        assert_eq!(reloaded.updated_at, Some(1_760_338_800));
        assert!(!reloaded.is_active);
        assert_eq!(reloaded.created_at, source.created_at);
    }

    #[tokio::test]
    async fn test_save_missing_source_is_error() {
        let db = test_db().await;
        let mut source = db
            .insert_source(&NewSource::new("Gone", "https://gone.example.com/rss"))
            .await
            .unwrap();
        sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source.id)
            .execute(&db.pool)
            .await
            .unwrap();

        source.last_parsed_at = Some(1);
        let err = db.save_source(&source).await.unwrap_err();
        assert!(matches!(err, DatabaseError::Other(sqlx::Error::RowNotFound)));
    }
}
