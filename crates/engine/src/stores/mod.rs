//! Per-user relational stores
//!
//! Plain-record repositories over PostgreSQL: ratings, watchlist entries,
//! emotional profiles and the served-recommendation log. Relationships are
//! joined explicitly at query sites; there is no lazy loading.

pub mod interactions;
pub mod profile;

pub use interactions::{RatingStore, RecommendationLogStore, WatchlistStore};
pub use profile::ProfileStore;
