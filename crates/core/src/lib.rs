//! # Mood Gateway Core
//!
//! Shared building blocks for the Mood Gateway platform: the typed error
//! set, environment configuration, domain models, vector math and the Redis
//! cache client used by every service crate.
//!
//! ## Modules
//!
//! - `types`: core enums (content types, room lifecycle, swipe actions)
//! - `models`: domain records for catalogue items, recommendations and rooms
//! - `error`: the `GatewayError` tagged error set
//! - `config`: environment-driven configuration loading and validation
//! - `math`: vector math for unit-norm embeddings
//! - `cache`: Redis JSON cache with transparent compression
//! - `observability`: tracing subscriber bootstrap

pub mod cache;
pub mod config;
pub mod error;
pub mod math;
pub mod models;
pub mod observability;
pub mod types;

// Re-export commonly used types
pub use cache::{CacheClient, CacheError};
pub use config::{load_dotenv, GatewayConfig, SchedulerConfig};
pub use error::GatewayError;
pub use math::{cosine_similarity, dot_product, l2_norm, normalize_vector};
pub use models::{
    CatalogueItem, CleanRec, DeckItem, EmotionalProfile, RecommendationEnvelope,
    RecommendationLogEntry, Room, RoomInteraction, RoomMatch, RoomParticipant, RoomSnapshot,
    UserRating, WatchlistEntry,
};
pub use observability::init_logging;
pub use types::{
    ContentType, RecommendationKind, RoomContentType, RoomStatus, SwipeAction, WatchStatus,
};

/// Result type alias for Mood Gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
