//! Core enum types for the Mood Gateway platform

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalogue content type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Movie,
    Tv,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Movie => "movie",
            ContentType::Tv => "tv",
        }
    }

    /// Both catalogue content types, in a fixed order.
    pub const ALL: [ContentType; 2] = [ContentType::Movie, ContentType::Tv];
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(ContentType::Movie),
            "tv" => Ok(ContentType::Tv),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

/// Content type selector for rooms; `mixed` pools both catalogues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomContentType {
    Movie,
    Tv,
    Mixed,
}

impl RoomContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomContentType::Movie => "movie",
            RoomContentType::Tv => "tv",
            RoomContentType::Mixed => "mixed",
        }
    }

    /// The index search filter this room type implies (`None` for mixed).
    pub fn filter(&self) -> Option<ContentType> {
        match self {
            RoomContentType::Movie => Some(ContentType::Movie),
            RoomContentType::Tv => Some(ContentType::Tv),
            RoomContentType::Mixed => None,
        }
    }
}

impl FromStr for RoomContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(RoomContentType::Movie),
            "tv" => Ok(RoomContentType::Tv),
            "mixed" => Ok(RoomContentType::Mixed),
            other => Err(format!("unknown room content type: {}", other)),
        }
    }
}

/// Room lifecycle state. Transitions are one-way: waiting -> voting -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Voting,
    Finished,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Voting => "voting",
            RoomStatus::Finished => "finished",
        }
    }
}

impl FromStr for RoomStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(RoomStatus::Waiting),
            "voting" => Ok(RoomStatus::Voting),
            "finished" => Ok(RoomStatus::Finished),
            other => Err(format!("unknown room status: {}", other)),
        }
    }
}

/// Swipe action recorded for a room participant.
///
/// The wire form is uppercase (`"LIKE"`); the stored form is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwipeAction {
    Like,
    Dislike,
    Superlike,
}

impl SwipeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwipeAction::Like => "like",
            SwipeAction::Dislike => "dislike",
            SwipeAction::Superlike => "superlike",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, SwipeAction::Like | SwipeAction::Superlike)
    }

    /// Weight used by the force-finish top-K scoring.
    pub fn weight(&self) -> i64 {
        match self {
            SwipeAction::Superlike => 3,
            SwipeAction::Like => 1,
            SwipeAction::Dislike => 0,
        }
    }
}

impl FromStr for SwipeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "like" => Ok(SwipeAction::Like),
            "dislike" => Ok(SwipeAction::Dislike),
            "superlike" => Ok(SwipeAction::Superlike),
            other => Err(format!("unknown swipe action: {}", other)),
        }
    }
}

/// Watchlist entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    ToWatch,
    Watching,
    Completed,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::ToWatch => "to_watch",
            WatchStatus::Watching => "watching",
            WatchStatus::Completed => "completed",
        }
    }
}

impl FromStr for WatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_watch" => Ok(WatchStatus::ToWatch),
            "watching" => Ok(WatchStatus::Watching),
            "completed" => Ok(WatchStatus::Completed),
            other => Err(format!("unknown watch status: {}", other)),
        }
    }
}

/// How a recommendation was produced, as recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    CurrentEmotion,
    HistoryBased,
    Hybrid,
    ProfileBased,
    EmotionPublic,
}

impl RecommendationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationKind::CurrentEmotion => "current_emotion",
            RecommendationKind::HistoryBased => "history_based",
            RecommendationKind::Hybrid => "hybrid",
            RecommendationKind::ProfileBased => "profile_based",
            RecommendationKind::EmotionPublic => "emotion_public",
        }
    }
}

impl FromStr for RecommendationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "current_emotion" => Ok(RecommendationKind::CurrentEmotion),
            "history_based" => Ok(RecommendationKind::HistoryBased),
            "hybrid" => Ok(RecommendationKind::Hybrid),
            "profile_based" => Ok(RecommendationKind::ProfileBased),
            "emotion_public" => Ok(RecommendationKind::EmotionPublic),
            other => Err(format!("unknown recommendation kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip() {
        for ct in ContentType::ALL {
            assert_eq!(ct.as_str().parse::<ContentType>().unwrap(), ct);
        }
    }

    #[test]
    fn test_swipe_action_wire_format_is_uppercase() {
        let json = serde_json::to_string(&SwipeAction::Superlike).unwrap();
        assert_eq!(json, "\"SUPERLIKE\"");

        let parsed: SwipeAction = serde_json::from_str("\"LIKE\"").unwrap();
        assert_eq!(parsed, SwipeAction::Like);
    }

    #[test]
    fn test_swipe_weights() {
        assert_eq!(SwipeAction::Superlike.weight(), 3);
        assert_eq!(SwipeAction::Like.weight(), 1);
        assert_eq!(SwipeAction::Dislike.weight(), 0);
        assert!(!SwipeAction::Dislike.is_positive());
    }

    #[test]
    fn test_room_content_type_filter() {
        assert_eq!(
            RoomContentType::Movie.filter(),
            Some(ContentType::Movie)
        );
        assert_eq!(RoomContentType::Mixed.filter(), None);
    }

    #[test]
    fn test_recommendation_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&RecommendationKind::CurrentEmotion).unwrap(),
            "\"current_emotion\""
        );
    }
}
