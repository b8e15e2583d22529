//! Bulk ingestion tests against a mock metadata provider

use async_trait::async_trait;
use mood_gateway_catalog::{ContentRepository, MetadataClient};
use mood_gateway_core::{CatalogueItem, ContentType, GatewayError};
use mood_gateway_engine::{CatalogIngester, Embedder, VectorIndex, EMBEDDING_DIM};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-memory stand-in for the relational mirror.
#[derive(Default)]
struct MemoryRepository {
    items: Mutex<HashMap<(ContentType, i64), CatalogueItem>>,
}

#[async_trait]
impl ContentRepository for MemoryRepository {
    async fn upsert(&self, item: &CatalogueItem) -> Result<(), GatewayError> {
        self.items.lock().await.insert(item.key(), item.clone());
        Ok(())
    }

    async fn get(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
    ) -> Result<Option<CatalogueItem>, GatewayError> {
        Ok(self.items.lock().await.get(&(content_type, tmdb_id)).cloned())
    }

    async fn all(&self) -> Result<Vec<CatalogueItem>, GatewayError> {
        Ok(self.items.lock().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<i64, GatewayError> {
        Ok(self.items.lock().await.len() as i64)
    }
}

/// Deterministic embedder: every text maps onto the first axis.
struct AxisEmbedder;

#[async_trait]
impl Embedder for AxisEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        if !text.trim().is_empty() {
            v[0] = 1.0;
        }
        Ok(v)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let mut out = Vec::new();
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

fn popular_page(low_rated_id: i64) -> serde_json::Value {
    let results: Vec<serde_json::Value> = (0..20i64)
        .map(|k| {
            let id = 1000 + k;
            serde_json::json!({
                "id": id,
                "title": format!("Movie {}", id),
                "vote_average": if id == low_rated_id { 5.7 } else { 7.1 },
            })
        })
        .collect();

    serde_json::json!({
        "page": 1,
        "results": results,
        "total_pages": 500,
        "total_results": 10_000
    })
}

async fn mount_catalogue(server: &MockServer, low_rated_id: i64) {
    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(popular_page(low_rated_id)))
        .mount(server)
        .await;

    for k in 0..20i64 {
        let id = 1000 + k;
        Mock::given(method("GET"))
            .and(path(format!("/movie/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": id,
                "title": format!("Movie {}", id),
                "overview": "a story",
                "genres": [{"name": "Drama"}],
                "release_date": "2019-05-01",
                "vote_average": if id == low_rated_id { 5.7 } else { 7.1 },
                "vote_count": 300
            })))
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_populate_continue_filters_and_indexes() {
    let server = MockServer::start().await;
    let low_rated_id = 1004;
    mount_catalogue(&server, low_rated_id).await;

    let repo = Arc::new(MemoryRepository::default());
    let index = Arc::new(VectorIndex::new(tempfile::tempdir().unwrap().into_path()));
    let ingester = CatalogIngester::new(
        Arc::new(MetadataClient::with_base_url("k".into(), server.uri(), None)),
        repo.clone(),
        index.clone(),
        Arc::new(AxisEmbedder),
        None,
    );

    let report = ingester
        .populate_continue(ContentType::Movie, 1)
        .await
        .unwrap();

    // One of the twenty titles sits below the rating floor
    assert_eq!(report.pages_processed, 1);
    assert_eq!(report.items_added, 19);
    assert_eq!(report.items_skipped, 1);
    assert_eq!(report.failed_pages, 0);
    assert_eq!(report.last_page, 1);

    assert_eq!(index.len(), 19);
    assert!(!index.contains(ContentType::Movie, low_rated_id));
    assert_eq!(repo.count().await.unwrap(), 19);

    // The durable mirror carries the same unit embedding that was indexed
    let stored = repo
        .get(ContentType::Movie, 1000)
        .await
        .unwrap()
        .expect("ingested item is mirrored");
    let norm = mood_gateway_core::l2_norm(&stored.embedding);
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_populate_continue_counts_failed_pages() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/movie/popular"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let ingester = CatalogIngester::new(
        Arc::new(MetadataClient::with_base_url("k".into(), server.uri(), None)),
        Arc::new(MemoryRepository::default()),
        Arc::new(VectorIndex::new(tempfile::tempdir().unwrap().into_path())),
        Arc::new(AxisEmbedder),
        None,
    );

    let report = ingester
        .populate_continue(ContentType::Movie, 2)
        .await
        .unwrap();

    // Failures are counted per page and the job carries on
    assert_eq!(report.failed_pages, 2);
    assert_eq!(report.pages_processed, 0);
    assert_eq!(report.items_added, 0);
    assert_eq!(report.last_page, 2);
}

#[tokio::test]
async fn test_reingesting_same_page_keeps_single_rows() {
    let server = MockServer::start().await;
    mount_catalogue(&server, 1004).await;

    let repo = Arc::new(MemoryRepository::default());
    let index = Arc::new(VectorIndex::new(tempfile::tempdir().unwrap().into_path()));
    let ingester = CatalogIngester::new(
        Arc::new(MetadataClient::with_base_url("k".into(), server.uri(), None)),
        repo.clone(),
        index.clone(),
        Arc::new(AxisEmbedder),
        None,
    );

    // Without a cache the cursor stays at zero, so the same page is walked
    // twice; upsert semantics keep one row per key
    ingester.populate_continue(ContentType::Movie, 1).await.unwrap();
    ingester.populate_continue(ContentType::Movie, 1).await.unwrap();

    assert_eq!(index.len(), 19);
    assert_eq!(repo.count().await.unwrap(), 19);
}
