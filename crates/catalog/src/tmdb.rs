//! Metadata provider API client
//!
//! One client composes the HTTP transport with a pass-through cache; every
//! endpoint returns the same `{data, status_code, success}` envelope. The
//! caching policy is a single table keyed by endpoint:
//!
//! | endpoint | in-process | Redis |
//! |---|---|---|
//! | `details` (with credits/keywords appended) | 10 min | 24 h (`tmdb:{ct}:{id}:details`) |
//! | `credits` / `recommendations` / `watch_providers` | 10 min | 24 h (`tmdb:{ct}:{id}:{endpoint}`) |
//! | `popular` / `search` / `discover` | 10 min | — |
//!
//! Rate limit: 40 requests per 10 seconds, enforced before every cache miss.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use moka::future::Cache;
use mood_gateway_core::{CacheClient, ContentType};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a single metadata call; exceeding it degrades to
/// "skip this candidate".
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level retries (connection failures only; HTTP errors are
/// answered with a failure envelope immediately).
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;

/// In-process response cache sizing.
const MEMORY_CACHE_CAPACITY: u64 = 10_000;
const MEMORY_CACHE_TTL: Duration = Duration::from_secs(600);

/// Redis TTL for per-title endpoints.
const DETAILS_TTL_SECS: u64 = 86_400;

/// Response envelope for every metadata call.
///
/// Non-2xx responses and transport failures yield `success == false` with an
/// empty `data` object; callers skip the candidate instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub data: Value,
    pub status_code: u16,
    pub success: bool,
}

impl ApiResponse {
    fn failure(status_code: u16) -> Self {
        Self {
            data: json!({}),
            status_code,
            success: false,
        }
    }
}

/// Filters accepted by the discover endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoverFilters {
    pub with_genres: Option<String>,
    pub primary_release_year: Option<i32>,
    pub first_air_date_year: Option<i32>,
    pub primary_release_date_gte: Option<String>,
    pub first_air_date_gte: Option<String>,
    pub vote_average_gte: Option<f32>,
    pub sort_by: Option<String>,
}

impl DiscoverFilters {
    fn append_to(&self, url: &mut String) {
        if let Some(genres) = &self.with_genres {
            url.push_str(&format!("&with_genres={}", urlencoding::encode(genres)));
        }
        if let Some(year) = self.primary_release_year {
            url.push_str(&format!("&primary_release_year={}", year));
        }
        if let Some(year) = self.first_air_date_year {
            url.push_str(&format!("&first_air_date_year={}", year));
        }
        if let Some(date) = &self.primary_release_date_gte {
            url.push_str(&format!("&primary_release_date.gte={}", date));
        }
        if let Some(date) = &self.first_air_date_gte {
            url.push_str(&format!("&first_air_date.gte={}", date));
        }
        if let Some(vote) = self.vote_average_gte {
            url.push_str(&format!("&vote_average.gte={}", vote));
        }
        if let Some(sort) = &self.sort_by {
            url.push_str(&format!("&sort_by={}", urlencoding::encode(sort)));
        }
    }
}

/// Typed client for the external movie/TV metadata provider.
#[derive(Clone)]
pub struct MetadataClient {
    client: Client,
    api_key: String,
    base_url: String,
    memory_cache: Cache<String, ApiResponse>,
    redis: Option<CacheClient>,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl MetadataClient {
    pub fn new(api_key: String, redis: Option<CacheClient>) -> Self {
        Self::with_base_url(api_key, "https://api.themoviedb.org/3".to_string(), redis)
    }

    /// Point the client at a different base URL (tests use a mock server).
    pub fn with_base_url(api_key: String, base_url: String, redis: Option<CacheClient>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        let memory_cache = Cache::builder()
            .max_capacity(MEMORY_CACHE_CAPACITY)
            .time_to_live(MEMORY_CACHE_TTL)
            .build();

        // 40 requests per 10 seconds
        let quota = Quota::with_period(Duration::from_millis(250))
            .expect("non-zero period")
            .allow_burst(NonZeroU32::new(40).expect("non-zero burst"));

        Self {
            client,
            api_key,
            base_url,
            memory_cache,
            redis,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Popular feed, one page.
    pub async fn popular(&self, content_type: ContentType, page: u32) -> ApiResponse {
        let url = format!(
            "{}/{}/popular?api_key={}&page={}",
            self.base_url, content_type, self.api_key, page
        );
        let cache_key = format!("popular:{}:{}", content_type, page);
        self.fetch(&cache_key, &url, None).await
    }

    /// Full details for one title, with credits and keywords appended.
    pub async fn details(&self, content_type: ContentType, tmdb_id: i64) -> ApiResponse {
        let url = format!(
            "{}/{}/{}?api_key={}&append_to_response=credits,keywords",
            self.base_url, content_type, tmdb_id, self.api_key
        );
        let cache_key = format!("details:{}:{}", content_type, tmdb_id);
        let redis_key = format!("tmdb:{}:{}:details", content_type, tmdb_id);
        self.fetch(&cache_key, &url, Some(redis_key)).await
    }

    /// Text search within one catalogue.
    pub async fn search(&self, content_type: ContentType, query: &str, page: u32) -> ApiResponse {
        let url = format!(
            "{}/search/{}?api_key={}&query={}&page={}",
            self.base_url,
            content_type,
            self.api_key,
            urlencoding::encode(query),
            page
        );
        let cache_key = format!("search:{}:{}:{}", content_type, query, page);
        self.fetch(&cache_key, &url, None).await
    }

    /// Filtered discovery feed.
    pub async fn discover(
        &self,
        content_type: ContentType,
        page: u32,
        filters: &DiscoverFilters,
    ) -> ApiResponse {
        let mut url = format!(
            "{}/discover/{}?api_key={}&page={}",
            self.base_url, content_type, self.api_key, page
        );
        filters.append_to(&mut url);

        let cache_key = format!(
            "discover:{}:{}:{}",
            content_type,
            page,
            serde_json::to_string(filters).unwrap_or_default()
        );
        self.fetch(&cache_key, &url, None).await
    }

    /// Cast and crew passthrough.
    pub async fn credits(&self, content_type: ContentType, tmdb_id: i64) -> ApiResponse {
        self.per_title(content_type, tmdb_id, "credits").await
    }

    /// Provider recommendations passthrough.
    pub async fn recommendations(&self, content_type: ContentType, tmdb_id: i64) -> ApiResponse {
        self.per_title(content_type, tmdb_id, "recommendations").await
    }

    /// Streaming availability passthrough.
    pub async fn watch_providers(&self, content_type: ContentType, tmdb_id: i64) -> ApiResponse {
        self.per_title(content_type, tmdb_id, "watch/providers").await
    }

    async fn per_title(
        &self,
        content_type: ContentType,
        tmdb_id: i64,
        endpoint: &str,
    ) -> ApiResponse {
        let url = format!(
            "{}/{}/{}/{}?api_key={}",
            self.base_url, content_type, tmdb_id, endpoint, self.api_key
        );
        let slug = endpoint.replace('/', "_");
        let cache_key = format!("{}:{}:{}", slug, content_type, tmdb_id);
        let redis_key = format!("tmdb:{}:{}:{}", content_type, tmdb_id, slug);
        self.fetch(&cache_key, &url, Some(redis_key)).await
    }

    /// Cache-aside fetch: memory, then Redis (per-title endpoints), then the
    /// rate-limited transport. Only successful responses are cached.
    async fn fetch(&self, cache_key: &str, url: &str, redis_key: Option<String>) -> ApiResponse {
        if let Some(cached) = self.memory_cache.get(cache_key).await {
            return cached;
        }

        if let (Some(redis), Some(key)) = (&self.redis, &redis_key) {
            match redis.get_json::<ApiResponse>(key).await {
                Ok(Some(cached)) => {
                    self.memory_cache
                        .insert(cache_key.to_string(), cached.clone())
                        .await;
                    return cached;
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Redis read failed, treating as miss"),
            }
        }

        self.limiter.until_ready().await;

        let mut backoff_ms = INITIAL_BACKOFF_MS;
        let mut attempt = 1;
        let response = loop {
            match self.client.get(url).send().await {
                Ok(response) => break response,
                Err(e) if attempt < MAX_RETRIES => {
                    warn!(attempt, backoff_ms, error = %e, "Metadata request failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Metadata request failed after {} attempts", MAX_RETRIES);
                    return ApiResponse::failure(0);
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, "Metadata request returned non-2xx");
            return ApiResponse::failure(status.as_u16());
        }

        let data: Value = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Metadata response body was not valid JSON");
                return ApiResponse::failure(status.as_u16());
            }
        };

        let envelope = ApiResponse {
            data,
            status_code: status.as_u16(),
            success: true,
        };

        self.memory_cache
            .insert(cache_key.to_string(), envelope.clone())
            .await;

        if let (Some(redis), Some(key)) = (&self.redis, &redis_key) {
            if let Err(e) = redis.set_json(key, &envelope, DETAILS_TTL_SECS).await {
                warn!(key = %key, error = %e, "Redis write failed");
            }
        }

        envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_envelope_shape() {
        let response = ApiResponse::failure(404);
        assert!(!response.success);
        assert_eq!(response.status_code, 404);
        assert_eq!(response.data, json!({}));
    }

    #[test]
    fn test_discover_filters_query_building() {
        let filters = DiscoverFilters {
            with_genres: Some("18,53".into()),
            primary_release_year: Some(2020),
            first_air_date_year: None,
            primary_release_date_gte: Some("2015-01-01".into()),
            first_air_date_gte: None,
            vote_average_gte: Some(6.0),
            sort_by: Some("popularity.desc".into()),
        };

        let mut url = String::new();
        filters.append_to(&mut url);

        assert!(url.contains("with_genres=18%2C53"));
        assert!(url.contains("primary_release_year=2020"));
        assert!(url.contains("primary_release_date.gte=2015-01-01"));
        assert!(url.contains("vote_average.gte=6"));
        assert!(url.contains("sort_by=popularity.desc"));
        assert!(!url.contains("first_air_date"));
    }

    #[test]
    fn test_client_creation() {
        let client = MetadataClient::new("test_key".to_string(), None);
        assert_eq!(client.base_url, "https://api.themoviedb.org/3");
    }
}
