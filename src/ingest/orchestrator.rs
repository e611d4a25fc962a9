use super::dedupe::{Admission, DedupeGate};
use super::error::IngestError;
use super::store::NewsStore;
use crate::feed::{normalize, now_timestamp, parse_feed, FeedFetcher};
use crate::storage::Source;

/// Per-feed tallies, logged once a source finishes.
#[derive(Debug, Default, Clone, Copy)]
struct ItemTally {
    inserted: usize,
    duplicates: usize,
    dropped: usize,
    failed: usize,
}

/// Runs the fetch, parse, normalize, dedupe and persist pipeline for sources.
///
/// Ingesting the same source repeatedly, or from several workers at once,
/// stores each (guid, source) item exactly once.
pub struct Ingestor<S> {
    fetcher: FeedFetcher,
    store: S,
}

impl<S: NewsStore> Ingestor<S> {
    pub fn new(fetcher: FeedFetcher, store: S) -> Self {
        Self { fetcher, store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest one source and return how many new items were stored.
    ///
    /// On success `source.last_parsed_at` and `source.updated_at` are set and
    /// saved, even when every item failed individually. A whole-feed failure
    /// leaves the source untouched.
    ///
    /// # Errors
    ///
    /// - [`IngestError::InvalidInput`] - the source URL is empty or malformed
    /// - [`IngestError::Transport`] - fetch failed
    /// - [`IngestError::EmptyResponse`] - the body was empty
    /// - [`IngestError::MalformedFeed`] - the body is not XML
    /// - [`IngestError::Storage`] - the source could not be saved
    pub async fn ingest(&self, source: &mut Source) -> Result<usize, IngestError> {
        let result = self.ingest_inner(source).await;
        if let Err(ref e) = result {
            tracing::error!(
                source_id = source.id,
                url = %source.url,
                error = %e,
                "Source ingestion failed"
            );
        }
        result
    }

    async fn ingest_inner(&self, source: &mut Source) -> Result<usize, IngestError> {
        if source.url.trim().is_empty() {
            return Err(IngestError::InvalidInput(format!(
                "source {} has no URL",
                source.id
            )));
        }

        tracing::debug!(source_id = source.id, url = %source.url, "Fetching feed");
        let bytes = self.fetcher.fetch(source.url.trim()).await?;
        if bytes.is_empty() {
            return Err(IngestError::EmptyResponse);
        }

        let raw_items = parse_feed(&bytes)?;
        let now = now_timestamp();
        let gate = DedupeGate::new(&self.store);
        let mut tally = ItemTally::default();

        // Each insert commits on its own; a failing item never rolls back the rest.
        for raw in raw_items {
            let Some(item) = normalize(&raw, now) else {
                tally.dropped += 1;
                continue;
            };

            match gate.admit(source.id, &item).await {
                Ok(Admission::Inserted(_)) => tally.inserted += 1,
                Ok(Admission::Duplicate) => tally.duplicates += 1,
                Err(e) => {
                    tracing::warn!(
                        source_id = source.id,
                        guid = %item.guid,
                        error = %e,
                        "Failed to store item, continuing with next"
                    );
                    tally.failed += 1;
                }
            }
        }

        let finished = now_timestamp();
        source.last_parsed_at = Some(finished);
        source.updated_at = Some(finished);
        self.store.save_source(source).await?;

        tracing::info!(
            source_id = source.id,
            source = %source.name,
            new_items = tally.inserted,
            duplicates = tally.duplicates,
            dropped = tally.dropped,
            failed = tally.failed,
            "Source ingested"
        );

        Ok(tally.inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use crate::feed::FetchError;
    use crate::storage::{Database, DatabaseError, Item, NewSource, ParsedItem};
    use async_trait::async_trait;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_ITEMS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
    <title>Example</title>
    <item>
        <guid>a</guid>
        <title>First story</title>
        <link>https://ex.com/a</link>
        <pubDate>Mon, 13 Oct 2025 07:00:00 GMT</pubDate>
    </item>
    <item>
        <guid>b</guid>
        <title>Second story</title>
        <link>https://ex.com/b</link>
        <pubDate>Mon, 13 Oct 2025 08:00:00 GMT</pubDate>
    </item>
</channel></rss>"#;

    fn fetcher(timeout: Duration) -> FeedFetcher {
        FeedFetcher::new(timeout, DEFAULT_USER_AGENT, 1024 * 1024).unwrap()
    }

    async fn setup(url: &str) -> (Database, Source) {
        let db = Database::open(":memory:").await.unwrap();
        let source = db
            .insert_source(&NewSource::new("Example", url))
            .await
            .unwrap();
        (db, source)
    }

    async fn serve(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_two_new_items_then_none() {
        let server = serve(TWO_ITEMS).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db.clone());

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 2);
        assert!(source.last_parsed_at.is_some());
        let stored = db.find_source_by_id(source.id).await.unwrap().unwrap();
        assert_eq!(stored.last_parsed_at, source.last_parsed_at);
        assert_eq!(db.count_items_for_source(source.id).await.unwrap(), 2);

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 0);
        assert_eq!(db.count_items_for_source(source.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_timeout_leaves_last_parsed_unset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(TWO_ITEMS)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_millis(200)), db.clone());

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::Transport(FetchError::Timeout)));
        assert_eq!(source.last_parsed_at, None);
        let stored = db.find_source_by_id(source.id).await.unwrap().unwrap();
        assert_eq!(stored.last_parsed_at, None);
        assert_eq!(db.count_items_for_source(source.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_url_is_invalid_input() {
        let (db, mut source) = setup("   ").await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(1)), db);

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_malformed_url_is_invalid_input() {
        let (db, mut source) = setup("lenta.ru/rss").await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(1)), db);

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let server = serve("").await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db);

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::EmptyResponse));
        assert_eq!(source.last_parsed_at, None);
    }

    #[tokio::test]
    async fn test_html_error_page_is_malformed() {
        let server = serve("<html><body><p>Temporarily unavailable<br></body></html>").await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db);

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedFeed(_)));
        assert_eq!(source.last_parsed_at, None);
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db);

        let err = ingestor.ingest(&mut source).await.unwrap_err();
        assert!(matches!(err, IngestError::Transport(FetchError::HttpStatus(503))));
    }

    #[tokio::test]
    async fn test_unparsable_dates_fall_back_to_now() {
        let feed = r#"<rss><channel>
    <item><guid>ok-1</guid><title>One</title><pubDate>Mon, 13 Oct 2025 07:00:00 GMT</pubDate></item>
    <item>
        <guid>bad</guid><title>Bad dates</title>
        <pubDate>not a date</pubDate>
        <published>yesterday</published>
        <updated>32/13/2025</updated>
        <dc:date>soon</dc:date>
    </item>
    <item><guid>ok-2</guid><title>Two</title><pubDate>2025-10-13T08:00:00Z</pubDate></item>
</channel></rss>"#;
        let server = serve(feed).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db.clone());

        let before = now_timestamp();
        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 3);
        let after = now_timestamp();

        let bad = db
            .find_item_by_guid_and_source("bad", source.id)
            .await
            .unwrap()
            .unwrap();
        assert!(bad.published_at >= before && bad.published_at <= after);

        let ok = db
            .find_item_by_guid_and_source("ok-1", source.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ok.published_at, 1_760_338_800);
    }

    #[tokio::test]
    async fn test_identityless_and_titleless_items_skipped() {
        let feed = r#"<rss><channel>
    <item><title>No identity at all</title><description>text</description></item>
    <item><guid>no-title</guid><description>text</description></item>
    <item><guid>  </guid><link>https://ex.com/kept</link><title>Kept via link</title></item>
</channel></rss>"#;
        let server = serve(feed).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db.clone());

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 1);
        let items = db.get_items_for_source(source.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].guid, "https://ex.com/kept");
    }

    #[tokio::test]
    async fn test_atom_entries_ingested() {
        let feed = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
    <title>Atom</title>
    <entry>
        <id>urn:uuid:1</id>
        <title>Atom entry</title>
        <link href="https://ex.com/atom/1"/>
        <summary>Short</summary>
        <updated>2025-10-13T07:00:00Z</updated>
    </entry>
</feed>"#;
        let server = serve(feed).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), db.clone());

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 1);
        let item = db
            .find_item_by_guid_and_source("urn:uuid:1", source.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.link.as_deref(), Some("https://ex.com/atom/1"));
        assert_eq!(item.description.as_deref(), Some("Short"));
        assert_eq!(item.content, None);
        assert_eq!(item.published_at, 1_760_338_800);
    }

    /// Store that refuses one guid, to exercise per-item recovery.
    struct FlakyStore {
        inner: Database,
        poisoned_guid: &'static str,
    }

    #[async_trait]
    impl NewsStore for FlakyStore {
        async fn find_source_by_id(&self, id: i64) -> Result<Option<Source>, DatabaseError> {
            self.inner.find_source_by_id(id).await
        }
        async fn find_active_sources(&self) -> Result<Vec<Source>, DatabaseError> {
            self.inner.find_active_sources().await
        }
        async fn find_item_by_guid_and_source(
            &self,
            guid: &str,
            source_id: i64,
        ) -> Result<Option<Item>, DatabaseError> {
            self.inner.find_item_by_guid_and_source(guid, source_id).await
        }
        async fn save_item(
            &self,
            source_id: i64,
            item: &ParsedItem,
        ) -> Result<Item, DatabaseError> {
            if item.guid == self.poisoned_guid {
                return Err(DatabaseError::Migration("simulated write failure".into()));
            }
            self.inner.save_item(source_id, item).await
        }
        async fn save_source(&self, source: &Source) -> Result<(), DatabaseError> {
            self.inner.save_source(source).await
        }
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_feed() {
        let server = serve(TWO_ITEMS).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let store = FlakyStore {
            inner: db.clone(),
            poisoned_guid: "a",
        };
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), store);

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 1);
        assert!(source.last_parsed_at.is_some());
        assert!(db
            .find_item_by_guid_and_source("b", source.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_all_items_failing_still_marks_parsed() {
        let feed = r#"<rss><channel><item><guid>a</guid><title>Only</title></item></channel></rss>"#;
        let server = serve(feed).await;
        let (db, mut source) = setup(&format!("{}/rss", server.uri())).await;
        let store = FlakyStore {
            inner: db.clone(),
            poisoned_guid: "a",
        };
        let ingestor = Ingestor::new(fetcher(Duration::from_secs(5)), store);

        assert_eq!(ingestor.ingest(&mut source).await.unwrap(), 0);
        let stored = db.find_source_by_id(source.id).await.unwrap().unwrap();
        assert!(stored.last_parsed_at.is_some());
    }
}
