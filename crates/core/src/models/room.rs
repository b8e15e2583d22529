//! Movie-room models

use crate::types::{ContentType, RoomContentType, RoomStatus, SwipeAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An ephemeral swipe session identified by a 6-character code.
///
/// The code is unique among non-finished rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub code: String,
    pub creator_session_id: String,
    pub status: RoomStatus,
    pub content_type: RoomContentType,
    pub max_participants: i32,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// When voting ends, measured from room creation.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

/// A participant within one room, keyed by an opaque session id.
/// `is_ready` implies a mood has been submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomParticipant {
    pub room_id: i64,
    pub session_id: String,
    pub mood: Option<String>,
    pub is_ready: bool,
    pub joined_at: DateTime<Utc>,
}

/// One recorded swipe. First write wins per (room, session, tmdb_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInteraction {
    pub room_id: i64,
    pub session_id: String,
    pub tmdb_id: i64,
    pub action: SwipeAction,
    pub created_at: DateTime<Utc>,
}

/// A title every participant liked, or a weighted top-K winner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMatch {
    pub room_id: i64,
    pub tmdb_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Outbound deck entry: catalogue metadata with the embedding stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckItem {
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub vote_average: f32,
    pub genres: Vec<String>,
    pub release_date: Option<String>,
}

impl From<&crate::models::content::CatalogueItem> for DeckItem {
    fn from(item: &crate::models::content::CatalogueItem) -> Self {
        Self {
            tmdb_id: item.tmdb_id,
            content_type: item.content_type,
            title: item.title.clone(),
            overview: item.overview.clone(),
            poster_path: item.poster_path.clone(),
            vote_average: item.vote_average,
            genres: item.genres.clone(),
            release_date: item.release_date.clone(),
        }
    }
}

/// Room state snapshot returned over HTTP and on rejoin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub code: String,
    pub status: RoomStatus,
    pub content_type: RoomContentType,
    pub max_participants: i32,
    pub duration_minutes: i32,
    pub participants_count: usize,
    pub ready_count: usize,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_expiry() {
        let created = Utc::now();
        let room = Room {
            id: 1,
            code: "AB12CD".into(),
            creator_session_id: "session-a".into(),
            status: RoomStatus::Waiting,
            content_type: RoomContentType::Movie,
            max_participants: 4,
            duration_minutes: 15,
            created_at: created,
        };
        assert_eq!(room.expires_at(), created + chrono::Duration::minutes(15));
    }

    #[test]
    fn test_deck_item_strips_embedding() {
        let item = crate::models::content::CatalogueItem {
            tmdb_id: 42,
            content_type: ContentType::Movie,
            title: "t".into(),
            original_title: None,
            overview: "o".into(),
            genres: vec![],
            release_date: None,
            poster_path: None,
            backdrop_path: None,
            vote_average: 7.0,
            vote_count: 10,
            popularity: 1.0,
            original_language: None,
            tagline: None,
            keywords: vec![],
            cast: vec![],
            network: None,
            embedding: vec![0.5; 8],
        };

        let deck = DeckItem::from(&item);
        let json = serde_json::to_string(&deck).unwrap();
        assert!(!json.contains("embedding"));
        assert_eq!(deck.tmdb_id, 42);
    }
}
