//! Domain models for catalogue content, recommendations and rooms

pub mod content;
pub mod rec;
pub mod room;

pub use content::CatalogueItem;
pub use rec::{
    CleanRec, EmotionalProfile, RecommendationEnvelope, RecommendationLogEntry, UserRating,
    WatchlistEntry,
};
pub use room::{DeckItem, Room, RoomInteraction, RoomMatch, RoomParticipant, RoomSnapshot};
