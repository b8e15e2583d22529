//! Shared application state
//!
//! Every subsystem is constructed once at startup and handed to the
//! handlers by reference; there are no ambient globals.

use mood_gateway_catalog::MetadataClient;
use mood_gateway_core::CacheClient;
use mood_gateway_engine::{
    CatalogIngester, EmotionAnalyzer, RecommendationEngine, VectorIndex, WatchlistStore,
};
use mood_gateway_rooms::{RoomEngine, RoomHub};
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub recommendations: Arc<RecommendationEngine>,
    pub analyzer: Arc<EmotionAnalyzer>,
    pub ingester: Arc<CatalogIngester>,
    pub watchlist: Arc<WatchlistStore>,
    pub rooms: Arc<RoomEngine>,
    pub hub: Arc<RoomHub>,
    pub index: Arc<VectorIndex>,
    pub metadata: Arc<MetadataClient>,
    pub cache: Option<CacheClient>,
    pub pool: PgPool,
}
