//! Emotion analysis and incremental profile updates
//!
//! Turns mood text into an embedding with a lightweight confidence score,
//! and folds each new rating into the user's emotional profile as a
//! rating-weighted running average. Profile updates for one user are
//! serialized: the running-average formula is not commutative, so two
//! concurrent ratings must not interleave.

use dashmap::DashMap;
use mood_gateway_core::{
    normalize_vector, ContentType, EmotionalProfile, GatewayError, UserRating,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::encoder::Embedder;
use crate::index::VectorIndex;
use crate::stores::{ProfileStore, RatingStore};

/// Result of analyzing free-form mood text.
#[derive(Debug, Clone)]
pub struct EmotionAnalysis {
    pub embedding: Vec<f32>,
    /// min(1, similar_titles / 10) against the movie catalogue
    pub confidence: f32,
}

/// One genre's share of the user's rating-weighted history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAffinity {
    pub genre: String,
    pub affinity: f32,
}

/// Lightweight profile characteristics derived from the rated set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileCharacteristics {
    pub watched_count: i32,
    pub confidence: f32,
    pub top_genres: Vec<GenreAffinity>,
}

/// Rating-weighted genre shares over the rated items, descending, top five.
pub fn genre_affinities(rated: &[(Vec<String>, i32)]) -> Vec<GenreAffinity> {
    let mut weights: HashMap<&str, f32> = HashMap::new();
    let mut total = 0.0f32;

    for (genres, rating) in rated {
        let weight = *rating as f32 / 10.0;
        for genre in genres {
            *weights.entry(genre.as_str()).or_insert(0.0) += weight;
            total += weight;
        }
    }

    if total <= 0.0 {
        return Vec::new();
    }

    let mut ranked: Vec<GenreAffinity> = weights
        .into_iter()
        .map(|(genre, weight)| GenreAffinity {
            genre: genre.to_string(),
            affinity: weight / total,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.affinity
            .partial_cmp(&a.affinity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.genre.cmp(&b.genre))
    });
    ranked.truncate(5);
    ranked
}

/// Fold one rated item into an existing profile embedding.
///
/// `new = normalize((old * count + item * rating/10) / (count + 1))`;
/// with no prior profile this reduces to the item direction itself.
pub fn blend_profile(
    existing: Option<(&[f32], i32)>,
    item_embedding: &[f32],
    rating: i32,
) -> (Vec<f32>, i32) {
    let weight = rating as f32 / 10.0;

    match existing {
        Some((old, count)) if count > 0 => {
            let mut blended: Vec<f32> = old
                .iter()
                .zip(item_embedding)
                .map(|(o, e)| (o * count as f32 + e * weight) / (count as f32 + 1.0))
                .collect();
            normalize_vector(&mut blended);
            (blended, count + 1)
        }
        _ => {
            let mut seeded: Vec<f32> = item_embedding.iter().map(|e| e * weight).collect();
            normalize_vector(&mut seeded);
            (seeded, 1)
        }
    }
}

/// Mood analysis plus per-user emotional profile maintenance.
pub struct EmotionAnalyzer {
    encoder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    profiles: Arc<ProfileStore>,
    ratings: Arc<RatingStore>,
    user_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl EmotionAnalyzer {
    pub fn new(
        encoder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        profiles: Arc<ProfileStore>,
        ratings: Arc<RatingStore>,
    ) -> Self {
        Self {
            encoder,
            index,
            profiles,
            ratings,
            user_locks: DashMap::new(),
        }
    }

    /// Encode mood text. The confidence score counts how many of the ten
    /// closest movie titles exist; the titles themselves are discarded.
    pub async fn analyze(&self, text: &str) -> Result<EmotionAnalysis, GatewayError> {
        let embedding = self.encoder.embed(text).await?;

        if embedding.iter().all(|&x| x == 0.0) {
            return Ok(EmotionAnalysis {
                embedding,
                confidence: 0.0,
            });
        }

        let similar = self.index.search(&embedding, 10, Some(ContentType::Movie));
        let confidence = (similar.len() as f32 / 10.0).min(1.0);

        Ok(EmotionAnalysis {
            embedding,
            confidence,
        })
    }

    /// Record a rating and fold the rated item into the user's profile.
    ///
    /// Re-submitting an unchanged rating still shifts the average again;
    /// callers that need idempotence must compare against the stored rating
    /// first.
    pub async fn update_profile(
        &self,
        user_id: i64,
        tmdb_id: i64,
        rating: i32,
        content_type: ContentType,
    ) -> Result<EmotionalProfile, GatewayError> {
        if !(1..=10).contains(&rating) {
            return Err(GatewayError::Validation(
                "rating must be between 1 and 10".into(),
            ));
        }

        let (_, item_embedding) = self
            .index
            .search_by_id(content_type, tmdb_id)
            .await?
            .ok_or_else(|| {
                GatewayError::NotFound(format!("{} {} has no embedding", content_type, tmdb_id))
            })?;

        let lock = self
            .user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let current = self.profiles.fetch(user_id).await?;
        let existing = current
            .as_ref()
            .and_then(|p| p.embedding.as_deref().map(|e| (e, p.watched_count)));

        let (embedding, watched_count) = blend_profile(existing, &item_embedding, rating);

        let profile = EmotionalProfile {
            user_id,
            embedding: Some(embedding),
            watched_count,
            confidence: EmotionalProfile::confidence_for(watched_count),
            last_updated: chrono::Utc::now(),
        };

        self.profiles.upsert(&profile).await?;

        info!(
            user_id,
            tmdb_id,
            watched_count,
            confidence = profile.confidence,
            "Updated emotional profile"
        );
        Ok(profile)
    }

    /// Upsert a rating row and shift the profile in one call.
    pub async fn record_rating(&self, rating: &UserRating) -> Result<EmotionalProfile, GatewayError> {
        self.ratings.upsert(rating).await?;
        self.update_profile(
            rating.user_id,
            rating.tmdb_id,
            rating.rating,
            rating.content_type,
        )
        .await
    }

    /// Profile characteristics for display: counters plus the genres the
    /// user's ratings lean toward.
    pub async fn characteristics(
        &self,
        user_id: i64,
    ) -> Result<ProfileCharacteristics, GatewayError> {
        let profile = self.profile_of(user_id).await?;

        let ratings = self.ratings.for_user(user_id).await?;
        let mut rated = Vec::with_capacity(ratings.len());
        for rating in &ratings {
            if let Some((item, _)) = self
                .index
                .search_by_id(rating.content_type, rating.tmdb_id)
                .await?
            {
                rated.push((item.genres, rating.rating));
            }
        }

        Ok(ProfileCharacteristics {
            watched_count: profile.watched_count,
            confidence: profile.confidence,
            top_genres: genre_affinities(&rated),
        })
    }

    /// Pure read of the stored profile; users without history get the empty
    /// profile (no embedding, zero confidence).
    pub async fn profile_of(&self, user_id: i64) -> Result<EmotionalProfile, GatewayError> {
        match self.profiles.fetch(user_id).await? {
            Some(profile) => Ok(profile),
            None => {
                debug!(user_id, "No stored profile");
                Ok(EmotionalProfile {
                    user_id,
                    embedding: None,
                    watched_count: 0,
                    confidence: 0.0,
                    last_updated: chrono::Utc::now(),
                })
            }
        }
    }
}
