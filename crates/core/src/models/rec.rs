//! Recommendation output and per-user interaction models

use crate::types::{ContentType, RecommendationKind, WatchStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fully enriched recommendation as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRec {
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub title: String,
    pub overview: String,
    pub backdrop_path: Option<String>,
    pub poster_path: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: f32,
    /// round(score * 100), clamped to [0, 100]
    pub similarity_score: i32,
    /// 1-based position within the full candidate ranking
    pub rank: usize,
}

/// Paginated recommendation response envelope.
///
/// `total` counts eligible candidates, not the page;
/// `total_pages = min(ceil(total / page_size), MAX_PAGES)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEnvelope {
    pub recommendations: Vec<CleanRec>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion_text: Option<String>,
}

impl RecommendationEnvelope {
    /// Empty envelope for degenerate inputs (blank mood, empty index).
    pub fn empty(method: &str, page: usize, page_size: usize) -> Self {
        Self {
            recommendations: Vec::new(),
            total: 0,
            page,
            page_size,
            total_pages: 0,
            method: method.to_string(),
            emotion_text: None,
        }
    }
}

/// A user's rating of one title. Unique per (user, tmdb, content_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRating {
    pub user_id: i64,
    pub tmdb_id: i64,
    pub content_type: ContentType,
    /// 1..=10
    pub rating: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user's watchlist entry, optionally carrying recommendation provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub user_id: i64,
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub status: WatchStatus,
    pub from_recommendation: bool,
    pub recommendation_type: Option<RecommendationKind>,
    pub recommendation_score: Option<f32>,
    pub added_at: DateTime<Utc>,
}

/// Per-user emotional profile: a rating-weighted running average of watched
/// items' embeddings. `embedding` is present iff `watched_count >= 1` and
/// `confidence == min(1, watched_count / 20)` at all times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalProfile {
    pub user_id: i64,
    pub embedding: Option<Vec<f32>>,
    pub watched_count: i32,
    pub confidence: f32,
    pub last_updated: DateTime<Utc>,
}

impl EmotionalProfile {
    pub fn confidence_for(watched_count: i32) -> f32 {
        (watched_count as f32 / 20.0).min(1.0)
    }
}

/// Append-only record of a served recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationLogEntry {
    pub user_id: i64,
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub recommendation_type: RecommendationKind,
    pub emotion_state: Option<String>,
    pub score: f32,
    pub viewed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_formula() {
        assert!((EmotionalProfile::confidence_for(0) - 0.0).abs() < f32::EPSILON);
        assert!((EmotionalProfile::confidence_for(1) - 0.05).abs() < 1e-6);
        assert!((EmotionalProfile::confidence_for(10) - 0.5).abs() < 1e-6);
        assert!((EmotionalProfile::confidence_for(20) - 1.0).abs() < f32::EPSILON);
        assert!((EmotionalProfile::confidence_for(50) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_envelope() {
        let envelope = RecommendationEnvelope::empty("current_emotion", 1, 9);
        assert_eq!(envelope.total, 0);
        assert_eq!(envelope.total_pages, 0);
        assert!(envelope.recommendations.is_empty());
    }

    #[test]
    fn test_envelope_omits_absent_emotion_text() {
        let envelope = RecommendationEnvelope::empty("history_based", 1, 9);
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains("emotion_text"));
    }
}
