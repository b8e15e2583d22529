//! Resumable bulk ingestion of the popular catalogue
//!
//! Walks the provider's popular feed page by page, resuming from a durable
//! cursor in the cache. Page failures are counted and skipped; the job never
//! aborts mid-batch. After each batch the index is persisted and given the
//! chance to switch to its optimized layout.

use mood_gateway_catalog::{list_entries, parse_detail, ContentRepository, MetadataClient};
use mood_gateway_core::{CacheClient, ContentType, GatewayError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::encoder::Embedder;
use crate::index::{VectorIndex, MIN_VOTE_AVERAGE};

/// Default pages ingested per run.
pub const DEFAULT_BATCH_PAGES: u32 = 25;

/// Cursor TTL: one week keeps a stalled deployment resumable.
const CURSOR_TTL_SECS: u64 = 7 * 86_400;

fn cursor_key(content_type: ContentType) -> String {
    format!("tmdb:ingest:popular:{}:last_page", content_type)
}

/// Outcome of one `populate_continue` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub pages_processed: u32,
    pub items_added: u64,
    pub items_skipped: u64,
    pub failed_pages: u32,
    pub last_page: u32,
}

/// Scheduled/admin-triggered catalogue ingester.
pub struct CatalogIngester {
    metadata: Arc<MetadataClient>,
    store: Arc<dyn ContentRepository>,
    index: Arc<VectorIndex>,
    encoder: Arc<dyn Embedder>,
    cache: Option<CacheClient>,
}

impl CatalogIngester {
    pub fn new(
        metadata: Arc<MetadataClient>,
        store: Arc<dyn ContentRepository>,
        index: Arc<VectorIndex>,
        encoder: Arc<dyn Embedder>,
        cache: Option<CacheClient>,
    ) -> Self {
        Self {
            metadata,
            store,
            index,
            encoder,
            cache,
        }
    }

    async fn read_cursor(&self, content_type: ContentType) -> u32 {
        let Some(cache) = &self.cache else { return 0 };
        match cache.get_json::<u32>(&cursor_key(content_type)).await {
            Ok(Some(page)) => page,
            Ok(None) => 0,
            Err(e) => {
                warn!(error = %e, "Cursor read failed, starting from page 0");
                0
            }
        }
    }

    async fn write_cursor(&self, content_type: ContentType, page: u32) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache
                .set_json(&cursor_key(content_type), &page, CURSOR_TTL_SECS)
                .await
            {
                warn!(error = %e, "Cursor write failed");
            }
        }
    }

    /// Ingest the next `batch_pages` pages of the popular feed, picking up
    /// where the previous run stopped. Idempotent across re-runs: the cursor
    /// advances deterministically and re-ingested titles overwrite in place.
    pub async fn populate_continue(
        &self,
        content_type: ContentType,
        batch_pages: u32,
    ) -> Result<IngestReport, GatewayError> {
        let last = self.read_cursor(content_type).await;
        let batch = batch_pages.max(1);
        let mut report = IngestReport {
            last_page: last + batch,
            ..Default::default()
        };

        info!(
            %content_type,
            from = last + 1,
            to = last + batch,
            "Starting popular ingestion batch"
        );

        for page in last + 1..=last + batch {
            let response = self.metadata.popular(content_type, page).await;
            if !response.success {
                warn!(page, status = response.status_code, "Popular page fetch failed");
                report.failed_pages += 1;
                continue;
            }

            report.pages_processed += 1;

            for entry in list_entries(&response.data) {
                if entry.vote_average < MIN_VOTE_AVERAGE {
                    report.items_skipped += 1;
                    continue;
                }

                match self.ingest_one(content_type, entry.tmdb_id).await {
                    Ok(true) => report.items_added += 1,
                    Ok(false) => report.items_skipped += 1,
                    Err(e) => {
                        warn!(tmdb_id = entry.tmdb_id, error = %e, "Item ingestion failed");
                        report.items_skipped += 1;
                    }
                }
            }
        }

        self.write_cursor(content_type, report.last_page).await;

        self.index.persist()?;
        let optimized = self.index.optimize_if_large();

        info!(
            %content_type,
            added = report.items_added,
            skipped = report.items_skipped,
            failed_pages = report.failed_pages,
            last_page = report.last_page,
            optimized,
            "Ingestion batch finished"
        );
        Ok(report)
    }

    /// Fetch, embed and store one title. Returns whether it entered the
    /// index.
    async fn ingest_one(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
    ) -> Result<bool, GatewayError> {
        let response = self.metadata.details(content_type, tmdb_id).await;
        if !response.success {
            return Ok(false);
        }

        let mut item = match parse_detail(content_type, &response.data) {
            Some(item) => item,
            None => return Ok(false),
        };

        if item.vote_average < MIN_VOTE_AVERAGE {
            return Ok(false);
        }

        let text = item.embedding_text();
        if text.is_empty() {
            return Ok(false);
        }

        item.embedding = self.encoder.embed(&text).await?;
        if item.embedding.iter().all(|&x| x == 0.0) {
            return Ok(false);
        }

        if !self.index.upsert(item.clone()) {
            return Ok(false);
        }
        self.store.upsert(&item).await?;
        Ok(true)
    }
}
