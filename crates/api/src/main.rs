//! Mood Gateway service entry point
//!
//! Builds every subsystem once, loads or rebuilds the vector index, starts
//! the scheduler when enabled, then serves HTTP. The process exits non-zero
//! only on unrecoverable configuration errors.

use anyhow::Context;
use mood_gateway_api::{AppState, Scheduler};
use mood_gateway_catalog::{ContentRepository, ContentStore, MetadataClient};
use mood_gateway_core::{init_logging, load_dotenv, CacheClient, GatewayConfig};
use mood_gateway_engine::{
    CatalogIngester, Embedder, EmotionAnalyzer, ProfileStore, RatingStore, RecommendationEngine,
    RecommendationLogStore, TextEncoder, VectorIndex, WatchlistStore,
};
use mood_gateway_rooms::{RoomEngine, RoomHub, RoomStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    init_logging();

    let config = GatewayConfig::from_env().context("configuration error")?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    MIGRATOR.run(&pool).await.context("migration failed")?;

    // Cache is best effort: a missing Redis degrades to uncached operation
    let cache = match CacheClient::new(&config.cache_url).await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(error = %e, "Redis unavailable, running without cache");
            None
        }
    };

    let encoder: Arc<dyn Embedder> = Arc::new(
        TextEncoder::new(&config.embedding_model_path).context("failed to load encoder model")?,
    );

    let metadata = Arc::new(MetadataClient::new(
        config.metadata_api_key.clone(),
        cache.clone(),
    ));

    let content_store: Arc<dyn ContentRepository> = Arc::new(ContentStore::new(pool.clone()));

    let index = Arc::new(
        VectorIndex::new(&config.index_dir).with_lazy_fetch(metadata.clone(), encoder.clone()),
    );
    index.load();
    if index.is_empty() {
        rebuild_index_from_store(&index, content_store.as_ref()).await;
    }
    info!(stats = ?index.stats(), "Vector index ready");

    let ratings = Arc::new(RatingStore::new(pool.clone()));
    let profiles = Arc::new(ProfileStore::new(pool.clone()));
    let rec_log = Arc::new(RecommendationLogStore::new(pool.clone()));
    let watchlist = Arc::new(WatchlistStore::new(pool.clone()));

    let recommendations = Arc::new(RecommendationEngine::new(
        index.clone(),
        encoder.clone(),
        metadata.clone(),
        cache.clone(),
        ratings.clone(),
        profiles.clone(),
        rec_log.clone(),
    ));

    let analyzer = Arc::new(EmotionAnalyzer::new(
        encoder.clone(),
        index.clone(),
        profiles.clone(),
        ratings.clone(),
    ));

    let ingester = Arc::new(CatalogIngester::new(
        metadata.clone(),
        content_store,
        index.clone(),
        encoder.clone(),
        cache.clone(),
    ));

    let rooms = Arc::new(RoomEngine::new(
        RoomStore::new(pool.clone()),
        index.clone(),
        encoder.clone(),
    ));
    let hub = Arc::new(RoomHub::new());

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            ingester.clone(),
            recommendations.clone(),
            metadata.clone(),
            rooms.clone(),
            cache.clone(),
        );
        Some(scheduler.start().context("scheduler start failed")?)
    } else {
        info!("Scheduler disabled");
        None
    };

    let state = Arc::new(AppState {
        recommendations,
        analyzer,
        ingester,
        watchlist,
        rooms,
        hub,
        index,
        metadata,
        cache,
        pool,
    });

    let result = mood_gateway_api::server::run(state, &config.host, config.port).await;

    if let Some(handle) = scheduler_handle {
        handle.stop();
    }
    result.context("server error")
}

/// Fall back to the relational mirror when the index files are missing or
/// unreadable.
async fn rebuild_index_from_store(index: &VectorIndex, store: &dyn ContentRepository) {
    match store.all().await {
        Ok(items) => {
            let mut restored = 0usize;
            for item in items {
                if index.add(item) {
                    restored += 1;
                }
            }
            if restored > 0 {
                info!(restored, "Rebuilt vector index from content store");
                if let Err(e) = index.persist() {
                    warn!(error = %e, "Could not persist rebuilt index");
                }
                index.optimize_if_large();
            }
        }
        Err(e) => warn!(error = %e, "Index rebuild from store failed, starting empty"),
    }
}
