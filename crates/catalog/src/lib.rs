//! # Mood Gateway Catalog
//!
//! Client and persistence layer for the external movie/TV catalogue: the
//! rate-aware metadata API client with its pass-through cache, the payload
//! parsers, and the relational mirror of catalogue embeddings.

pub mod parse;
pub mod store;
pub mod tmdb;

pub use parse::{list_entries, parse_detail, total_pages, ListEntry};
pub use store::{connect_pool, ContentRepository, ContentStore};
pub use tmdb::{ApiResponse, DiscoverFilters, MetadataClient};
