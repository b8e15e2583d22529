//! # Mood Gateway Engine
//!
//! The recommendation core: sentence encoder, vector index, emotion
//! analysis with per-user profiles, the recommendation query planner and the
//! resumable catalogue ingester.
//!
//! ## Modules
//!
//! - `encoder`: ONNX sentence encoder behind the `Embedder` seam
//! - `index`: flat/IVF inner-product index with disk persistence
//! - `emotion`: mood analysis and incremental profile updates
//! - `recommend`: the recommendation modes and enrichment pipeline
//! - `stores`: per-user relational repositories
//! - `ingest`: scheduled bulk ingestion of popular content

pub mod emotion;
pub mod encoder;
pub mod index;
pub mod ingest;
pub mod recommend;
pub mod stores;

pub use emotion::{
    blend_profile, genre_affinities, EmotionAnalysis, EmotionAnalyzer, GenreAffinity,
    ProfileCharacteristics,
};
pub use encoder::{Embedder, TextEncoder, EMBEDDING_DIM};
pub use index::{IndexStats, ScoredItem, VectorIndex, MIN_VOTE_AVERAGE};
pub use ingest::{CatalogIngester, IngestReport, DEFAULT_BATCH_PAGES};
pub use recommend::{
    preference_vector, Candidate, RecommendationEngine, EMBEDDING_TOP_K, MAX_PAGES,
    MAX_RECOMMENDATIONS, PAGE_SIZE,
};
pub use stores::{ProfileStore, RatingStore, RecommendationLogStore, WatchlistStore};
