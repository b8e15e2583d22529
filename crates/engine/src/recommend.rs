//! Recommendation engine
//!
//! The query planner behind every recommendation mode: builds a query vector
//! from mood text, the stored profile, rating history or a blend, searches
//! the vector index, applies the score-band shuffle and exclusion filters,
//! then enriches a stable page of results through the metadata provider.
//!
//! Per-item enrichment failures (missing details, rating drop, provider
//! errors) shrink the page instead of failing the request.

use futures::stream::{self, StreamExt};
use mood_gateway_catalog::{parse_detail, MetadataClient};
use mood_gateway_core::{
    normalize_vector, CacheClient, CatalogueItem, CleanRec, ContentType, GatewayError,
    RecommendationEnvelope, RecommendationKind, RecommendationLogEntry,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::encoder::Embedder;
use crate::index::{ScoredItem, VectorIndex, MIN_VOTE_AVERAGE};
use crate::stores::{ProfileStore, RatingStore, RecommendationLogStore};

pub const PAGE_SIZE: usize = 9;
pub const MAX_PAGES: usize = 5;
pub const MAX_RECOMMENDATIONS: usize = 45;
pub const EMBEDDING_TOP_K: usize = 200;

const DETAILS_FETCH_CHUNK: usize = 18;
const ENRICH_CONCURRENCY: usize = 8;
const SCORE_BAND_WIDTH: f32 = 0.02;

const USER_ENVELOPE_TTL: u64 = 300;
const PUBLIC_ENVELOPE_TTL: u64 = 600;

const HYBRID_CURRENT_WEIGHT: f32 = 0.7;
const HYBRID_PROFILE_WEIGHT: f32 = 0.3;

/// Lightweight candidate between index search and enrichment.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub tmdb_id: i64,
    pub content_type: ContentType,
    pub score: f32,
    /// 1-based position in the post-shuffle ranking
    pub rank: usize,
}

/// Shuffle candidates within score bands, preserving band order.
///
/// Bands are runs of consecutive items whose score is within
/// `SCORE_BAND_WIDTH` of the band anchor (the first item of the band).
pub fn band_shuffle_with<R: Rng>(results: Vec<ScoredItem>, rng: &mut R) -> Vec<ScoredItem> {
    let mut shuffled = Vec::with_capacity(results.len());
    let mut band: Vec<ScoredItem> = Vec::new();
    let mut anchor = f32::INFINITY;

    for item in results {
        if band.is_empty() || anchor - item.score <= SCORE_BAND_WIDTH {
            if band.is_empty() {
                anchor = item.score;
            }
            band.push(item);
        } else {
            band.shuffle(rng);
            shuffled.append(&mut band);
            anchor = item.score;
            band.push(item);
        }
    }

    band.shuffle(rng);
    shuffled.append(&mut band);
    shuffled
}

fn band_shuffle(results: Vec<ScoredItem>) -> Vec<ScoredItem> {
    band_shuffle_with(results, &mut rand::thread_rng())
}

/// Deduplicate by key (first seen wins), drop excluded titles, assign ranks.
pub fn build_candidates(
    results: &[ScoredItem],
    exclude: &HashSet<(ContentType, i64)>,
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::with_capacity(results.len());

    for scored in results {
        let key = scored.item.key();
        if exclude.contains(&key) || !seen.insert(key) {
            continue;
        }
        candidates.push(Candidate {
            tmdb_id: scored.item.tmdb_id,
            content_type: scored.item.content_type,
            score: scored.score,
            rank: candidates.len() + 1,
        });
    }

    candidates
}

/// Build the rating-weighted preference vector over a user's rated items.
///
/// Weights are `rating / 10`, normalized to sum to one; the result is
/// re-normalized to unit length. `None` when there is nothing to average.
pub fn preference_vector(rated: &[(Vec<f32>, i32)]) -> Option<Vec<f32>> {
    let weights: Vec<f32> = rated.iter().map(|(_, r)| *r as f32 / 10.0).collect();
    let total: f32 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }

    let dim = rated.first()?.0.len();
    let mut blended = vec![0.0f32; dim];
    for ((embedding, _), weight) in rated.iter().zip(&weights) {
        for (acc, x) in blended.iter_mut().zip(embedding) {
            *acc += x * (weight / total);
        }
    }

    normalize_vector(&mut blended);
    if blended.iter().all(|&x| x == 0.0) {
        None
    } else {
        Some(blended)
    }
}

fn similarity_score(score: f32) -> i32 {
    ((score * 100.0).round() as i32).clamp(0, 100)
}

fn total_pages_for(total: usize, page_size: usize) -> usize {
    if total == 0 {
        0
    } else {
        ((total + page_size - 1) / page_size).min(MAX_PAGES)
    }
}

fn clamp_page(page: usize) -> usize {
    page.clamp(1, MAX_PAGES)
}

/// The recommendation query planner.
pub struct RecommendationEngine {
    index: Arc<VectorIndex>,
    encoder: Arc<dyn Embedder>,
    metadata: Arc<MetadataClient>,
    cache: Option<CacheClient>,
    ratings: Arc<RatingStore>,
    profiles: Arc<ProfileStore>,
    rec_log: Arc<RecommendationLogStore>,
}

impl RecommendationEngine {
    pub fn new(
        index: Arc<VectorIndex>,
        encoder: Arc<dyn Embedder>,
        metadata: Arc<MetadataClient>,
        cache: Option<CacheClient>,
        ratings: Arc<RatingStore>,
        profiles: Arc<ProfileStore>,
        rec_log: Arc<RecommendationLogStore>,
    ) -> Self {
        Self {
            index,
            encoder,
            metadata,
            cache,
            ratings,
            profiles,
            rec_log,
        }
    }

    /// Recommendations for the user's current mood text.
    pub async fn current_emotion(
        &self,
        user_id: i64,
        text: &str,
        content_type: ContentType,
        page: usize,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let page = clamp_page(page);
        let method = RecommendationKind::CurrentEmotion;

        if text.trim().is_empty() {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let cache_key = format!(
            "rec:emotion:{}:{}:{}:p{}",
            user_id, text, content_type, page
        );
        if let Some(cached) = self.cached_envelope(&cache_key).await {
            return Ok(cached);
        }

        let query = self.encoder.embed(text).await?;
        let exclude = self.ratings.rated_keys(user_id).await?;

        let envelope = self
            .search_and_serve(&query, content_type, page, &exclude, method, Some(text))
            .await?;

        self.store_envelope(&cache_key, &envelope, USER_ENVELOPE_TTL).await;
        self.log_served(user_id, &envelope, method, Some(text)).await;
        Ok(envelope)
    }

    /// Mood text blended with the stored emotional profile (0.7 / 0.3).
    /// Falls back to the pure mood search for users without a profile.
    pub async fn hybrid(
        &self,
        user_id: i64,
        text: &str,
        content_type: ContentType,
        page: usize,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let page = clamp_page(page);
        let method = RecommendationKind::Hybrid;

        if text.trim().is_empty() {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let profile = self.profiles.fetch(user_id).await?;
        let profile_embedding = match profile.and_then(|p| p.embedding) {
            Some(embedding) => embedding,
            None => {
                debug!(user_id, "No profile, hybrid falls back to current emotion");
                return self.current_emotion(user_id, text, content_type, page).await;
            }
        };

        let cache_key = format!("rec:hybrid:{}:{}:{}:p{}", user_id, text, content_type, page);
        if let Some(cached) = self.cached_envelope(&cache_key).await {
            return Ok(cached);
        }

        let current = self.encoder.embed(text).await?;
        if current.iter().all(|&x| x == 0.0) {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let mut query: Vec<f32> = current
            .iter()
            .zip(&profile_embedding)
            .map(|(c, p)| HYBRID_CURRENT_WEIGHT * c + HYBRID_PROFILE_WEIGHT * p)
            .collect();
        normalize_vector(&mut query);

        let exclude = self.ratings.rated_keys(user_id).await?;
        let envelope = self
            .search_and_serve(&query, content_type, page, &exclude, method, Some(text))
            .await?;

        self.store_envelope(&cache_key, &envelope, USER_ENVELOPE_TTL).await;
        self.log_served(user_id, &envelope, method, Some(text)).await;
        Ok(envelope)
    }

    /// Recommendations from the full rating history, rebuilt on the fly.
    /// Not paginated; serves up to `MAX_RECOMMENDATIONS` titles.
    pub async fn history_based(
        &self,
        user_id: i64,
        content_type: ContentType,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let method = RecommendationKind::HistoryBased;
        let ratings = self.ratings.for_user(user_id).await?;

        let mut rated = Vec::with_capacity(ratings.len());
        for rating in &ratings {
            match self
                .index
                .search_by_id(rating.content_type, rating.tmdb_id)
                .await?
            {
                Some((_, embedding)) => rated.push((embedding, rating.rating)),
                None => debug!(
                    tmdb_id = rating.tmdb_id,
                    "Rated item has no embedding, skipping"
                ),
            }
        }

        let query = match preference_vector(&rated) {
            Some(query) => query,
            None => {
                return Ok(RecommendationEnvelope::empty(
                    method.as_str(),
                    1,
                    MAX_RECOMMENDATIONS,
                ))
            }
        };

        let exclude = self.ratings.rated_keys(user_id).await?;

        let envelope = self
            .serve_unpaginated(&query, content_type, &exclude, method)
            .await?;
        self.log_served(user_id, &envelope, method, None).await;
        Ok(envelope)
    }

    /// Like `history_based` but uses the stored profile embedding directly.
    /// Fails with `NoProfile` when the user has no history.
    pub async fn profile_based(
        &self,
        user_id: i64,
        content_type: ContentType,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let method = RecommendationKind::ProfileBased;

        let query = self
            .profiles
            .fetch(user_id)
            .await?
            .and_then(|p| p.embedding)
            .ok_or(GatewayError::NoProfile)?;

        let exclude = self.ratings.rated_keys(user_id).await?;

        let envelope = self
            .serve_unpaginated(&query, content_type, &exclude, method)
            .await?;
        self.log_served(user_id, &envelope, method, None).await;
        Ok(envelope)
    }

    /// Anonymous mood search; only caller-supplied exclusions apply.
    pub async fn emotion_public(
        &self,
        text: &str,
        content_type: ContentType,
        page: usize,
        exclude_ids: &[i64],
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let page = clamp_page(page);
        let method = RecommendationKind::EmotionPublic;

        if text.trim().is_empty() {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let cache_key = format!(
            "rec:public:emotion:{}:{}:p{}:sz{}",
            text, content_type, page, PAGE_SIZE
        );
        if exclude_ids.is_empty() {
            if let Some(cached) = self.cached_envelope(&cache_key).await {
                return Ok(cached);
            }
        }

        let query = self.encoder.embed(text).await?;
        let exclude: HashSet<(ContentType, i64)> = exclude_ids
            .iter()
            .map(|&id| (content_type, id))
            .collect();

        let envelope = self
            .search_and_serve(&query, content_type, page, &exclude, method, Some(text))
            .await?;

        if exclude_ids.is_empty() {
            self.store_envelope(&cache_key, &envelope, PUBLIC_ENVELOPE_TTL).await;
        }
        Ok(envelope)
    }

    /// Anonymous mood search across both catalogues: one search per content
    /// type, merged, sorted by score and paginated.
    pub async fn emotion_public_all(
        &self,
        text: &str,
        page: usize,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let page = clamp_page(page);
        let method = RecommendationKind::EmotionPublic;

        if text.trim().is_empty() {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let cache_key = format!("rec:public:emotion:{}:all:p{}:sz{}", text, page, PAGE_SIZE);
        if let Some(cached) = self.cached_envelope(&cache_key).await {
            return Ok(cached);
        }

        let query = self.encoder.embed(text).await?;
        if query.iter().all(|&x| x == 0.0) {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let mut merged: Vec<ScoredItem> = Vec::new();
        for content_type in ContentType::ALL {
            merged.extend(self.index.search(&query, EMBEDDING_TOP_K, Some(content_type)));
        }
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let candidates = build_candidates(&merged, &HashSet::new());
        let envelope = self
            .paginate_and_enrich(&candidates, page, PAGE_SIZE, method, Some(text))
            .await;

        self.store_envelope(&cache_key, &envelope, PUBLIC_ENVELOPE_TTL).await;
        Ok(envelope)
    }

    async fn search_and_serve(
        &self,
        query: &[f32],
        content_type: ContentType,
        page: usize,
        exclude: &HashSet<(ContentType, i64)>,
        method: RecommendationKind,
        emotion_text: Option<&str>,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        if query.iter().all(|&x| x == 0.0) {
            return Ok(RecommendationEnvelope::empty(method.as_str(), page, PAGE_SIZE));
        }

        let raw = self.index.search(query, EMBEDDING_TOP_K, Some(content_type));
        let shuffled = band_shuffle(raw);
        let candidates = build_candidates(&shuffled, exclude);

        Ok(self
            .paginate_and_enrich(&candidates, page, PAGE_SIZE, method, emotion_text)
            .await)
    }

    async fn serve_unpaginated(
        &self,
        query: &[f32],
        content_type: ContentType,
        exclude: &HashSet<(ContentType, i64)>,
        method: RecommendationKind,
    ) -> Result<RecommendationEnvelope, GatewayError> {
        let raw = self.index.search(query, EMBEDDING_TOP_K, Some(content_type));
        let shuffled = band_shuffle(raw);
        let mut candidates = build_candidates(&shuffled, exclude);
        candidates.truncate(MAX_RECOMMENDATIONS);

        Ok(self
            .paginate_and_enrich(&candidates, 1, MAX_RECOMMENDATIONS, method, None)
            .await)
    }

    /// Stable paginated enrichment: look-ahead chunks keep the page full
    /// even when individual candidates drop out during enrichment.
    async fn paginate_and_enrich(
        &self,
        candidates: &[Candidate],
        page: usize,
        page_size: usize,
        method: RecommendationKind,
        emotion_text: Option<&str>,
    ) -> RecommendationEnvelope {
        let total = candidates.len();
        let mut recommendations = Vec::new();

        let mut i = (page - 1) * page_size;
        while i < candidates.len() && recommendations.len() < page_size {
            let end = (i + DETAILS_FETCH_CHUNK).min(candidates.len());

            let chunk: Vec<Candidate> = candidates[i..end].to_vec();
            let fetched: Vec<Option<CleanRec>> = stream::iter(chunk)
                .map(|candidate| self.fetch_clean(candidate))
                .buffered(ENRICH_CONCURRENCY)
                .collect()
                .await;

            for rec in fetched.into_iter().flatten() {
                if recommendations.len() < page_size {
                    recommendations.push(rec);
                }
            }

            i = end;
        }

        RecommendationEnvelope {
            recommendations,
            total,
            page,
            page_size,
            total_pages: total_pages_for(total, page_size),
            method: method.as_str().to_string(),
            emotion_text: emotion_text.map(|t| t.to_string()),
        }
    }

    /// Enrich one candidate. Any failure skips the candidate.
    async fn fetch_clean(&self, candidate: Candidate) -> Option<CleanRec> {
        let response = self
            .metadata
            .details(candidate.content_type, candidate.tmdb_id)
            .await;
        if !response.success {
            debug!(
                tmdb_id = candidate.tmdb_id,
                status = response.status_code,
                "Details fetch failed, skipping candidate"
            );
            return None;
        }

        let item: CatalogueItem = parse_detail(candidate.content_type, &response.data)?;
        if item.vote_average < MIN_VOTE_AVERAGE {
            return None;
        }

        Some(CleanRec {
            tmdb_id: candidate.tmdb_id,
            content_type: candidate.content_type,
            title: item.title,
            overview: item.overview,
            backdrop_path: item.backdrop_path,
            poster_path: item.poster_path,
            release_date: item.release_date,
            vote_average: item.vote_average,
            similarity_score: similarity_score(candidate.score),
            rank: candidate.rank,
        })
    }

    async fn cached_envelope(&self, key: &str) -> Option<RecommendationEnvelope> {
        let cache = self.cache.as_ref()?;
        match cache.get_json(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(key = %key, error = %e, "Envelope cache read failed");
                None
            }
        }
    }

    async fn store_envelope(&self, key: &str, envelope: &RecommendationEnvelope, ttl: u64) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_json(key, envelope, ttl).await {
                warn!(key = %key, error = %e, "Envelope cache write failed");
            }
        }
    }

    async fn log_served(
        &self,
        user_id: i64,
        envelope: &RecommendationEnvelope,
        method: RecommendationKind,
        emotion_text: Option<&str>,
    ) {
        let entries: Vec<RecommendationLogEntry> = envelope
            .recommendations
            .iter()
            .map(|rec| RecommendationLogEntry {
                user_id,
                tmdb_id: rec.tmdb_id,
                content_type: rec.content_type,
                recommendation_type: method,
                emotion_state: emotion_text.map(|t| t.to_string()),
                score: rec.similarity_score as f32 / 100.0,
                viewed: false,
            })
            .collect();

        if entries.is_empty() {
            return;
        }
        if let Err(e) = self.rec_log.append(&entries).await {
            warn!(user_id, error = %e, "Failed to append recommendation log");
        }
    }
}
