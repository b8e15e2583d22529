//! Content store: durable mirror of the vector index
//!
//! Each row keeps the catalogue payload and its embedding, keyed by
//! `(tmdb_id, content_type)`. The store answers embedding-by-id lookups and
//! rebuilds the in-memory index after a cold start or index-file loss.

use anyhow::Context;
use async_trait::async_trait;
use mood_gateway_core::{CatalogueItem, ContentType, GatewayError};
use sqlx::{PgPool, Row};
use tracing::info;

/// Persistence operations for catalogue embeddings.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Insert or overwrite one item (fields and embedding recomputed on
    /// re-ingest).
    async fn upsert(&self, item: &CatalogueItem) -> Result<(), GatewayError>;

    /// Fetch one item with its embedding.
    async fn get(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
    ) -> Result<Option<CatalogueItem>, GatewayError>;

    /// Full scan, used to rebuild the vector index.
    async fn all(&self) -> Result<Vec<CatalogueItem>, GatewayError>;

    /// Number of stored items.
    async fn count(&self) -> Result<i64, GatewayError>;
}

/// PostgreSQL implementation of `ContentRepository`.
pub struct ContentStore {
    pool: PgPool,
}

impl ContentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_item(row: &sqlx::postgres::PgRow) -> Result<CatalogueItem, GatewayError> {
        let metadata: serde_json::Value = row.try_get("metadata")?;
        let embedding: serde_json::Value = row.try_get("embedding")?;

        let mut item: CatalogueItem = serde_json::from_value(metadata)?;
        item.embedding = serde_json::from_value(embedding)?;
        Ok(item)
    }
}

#[async_trait]
impl ContentRepository for ContentStore {
    async fn upsert(&self, item: &CatalogueItem) -> Result<(), GatewayError> {
        // The metadata column holds the payload without its vector; the
        // vector gets its own column so either side can be read alone.
        let mut stripped = item.clone();
        stripped.embedding = Vec::new();

        let metadata = serde_json::to_value(&stripped)?;
        let embedding = serde_json::to_value(&item.embedding)?;

        sqlx::query(
            r#"
            INSERT INTO content_embeddings (tmdb_id, content_type, metadata, embedding, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (tmdb_id, content_type)
            DO UPDATE SET metadata = $3, embedding = $4, updated_at = NOW()
            "#,
        )
        .bind(item.tmdb_id)
        .bind(item.content_type.as_str())
        .bind(metadata)
        .bind(embedding)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
    ) -> Result<Option<CatalogueItem>, GatewayError> {
        let row = sqlx::query(
            r#"
            SELECT metadata, embedding
            FROM content_embeddings
            WHERE tmdb_id = $1 AND content_type = $2
            "#,
        )
        .bind(tmdb_id)
        .bind(content_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn all(&self) -> Result<Vec<CatalogueItem>, GatewayError> {
        let rows = sqlx::query(
            r#"
            SELECT metadata, embedding
            FROM content_embeddings
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in &rows {
            items.push(Self::row_to_item(row)?);
        }

        info!(count = items.len(), "Loaded catalogue items from store");
        Ok(items)
    }

    async fn count(&self) -> Result<i64, GatewayError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM content_embeddings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

/// Connect a pool suitable for the store (used by integration tests).
pub async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("Failed to connect to PostgreSQL")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_item() -> CatalogueItem {
        CatalogueItem {
            tmdb_id: 603,
            content_type: ContentType::Movie,
            title: "The Matrix".into(),
            original_title: None,
            overview: "A computer hacker learns the truth.".into(),
            genres: vec!["Action".into(), "Science Fiction".into()],
            release_date: Some("1999-03-30".into()),
            poster_path: None,
            backdrop_path: None,
            vote_average: 8.2,
            vote_count: 24000,
            popularity: 80.0,
            original_language: Some("en".into()),
            tagline: None,
            keywords: vec![],
            cast: vec![],
            network: None,
            embedding: vec![0.6, 0.8],
        }
    }

    #[tokio::test]
    async fn test_upsert_get_round_trip() {
        // Requires a running PostgreSQL with the content_embeddings table
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("Skipping test: DATABASE_URL not set");
                return;
            }
        };
        let pool = match connect_pool(&url).await {
            Ok(pool) => pool,
            Err(_) => {
                eprintln!("Skipping test: PostgreSQL not available");
                return;
            }
        };

        let store = ContentStore::new(pool);
        let item = sample_item();

        store.upsert(&item).await.unwrap();
        let loaded = store
            .get(ContentType::Movie, item.tmdb_id)
            .await
            .unwrap()
            .expect("item should exist");

        assert_eq!(loaded.title, item.title);
        assert_eq!(loaded.embedding, item.embedding);

        // Re-ingest overwrites in place
        let mut updated = item.clone();
        updated.vote_average = 8.3;
        updated.embedding = vec![0.8, 0.6];
        store.upsert(&updated).await.unwrap();

        let loaded = store
            .get(ContentType::Movie, item.tmdb_id)
            .await
            .unwrap()
            .unwrap();
        assert!((loaded.vote_average - 8.3).abs() < 1e-6);
        assert_eq!(loaded.embedding, vec![0.8, 0.6]);
    }
}
