//! User-scoped recommendation modes against a real PostgreSQL
//!
//! These tests bootstrap the schema via the workspace migrations and skip
//! when no database is reachable.

use async_trait::async_trait;
use mood_gateway_catalog::MetadataClient;
use mood_gateway_core::{normalize_vector, CatalogueItem, ContentType, GatewayError};
use mood_gateway_engine::{
    Embedder, EmotionAnalyzer, ProfileStore, RatingStore, RecommendationEngine,
    RecommendationLogStore, VectorIndex, EMBEDDING_DIM,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .ok()?;
    MIGRATOR.run(&pool).await.ok()?;
    Some(pool)
}

struct CannedEmbedder {
    responses: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl Embedder for CannedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0; EMBEDDING_DIM]))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

fn axis_vector(x: f32, y: f32) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[0] = x;
    v[1] = y;
    normalize_vector(&mut v);
    v
}

fn item(tmdb_id: i64, embedding: Vec<f32>) -> CatalogueItem {
    CatalogueItem {
        tmdb_id,
        content_type: ContentType::Movie,
        title: format!("Movie {}", tmdb_id),
        original_title: None,
        overview: "overview".into(),
        genres: vec!["Drama".into()],
        release_date: Some("2020-01-01".into()),
        poster_path: None,
        backdrop_path: None,
        vote_average: 7.5,
        vote_count: 500,
        popularity: 10.0,
        original_language: None,
        tagline: None,
        keywords: vec![],
        cast: vec![],
        network: None,
        embedding,
    }
}

fn build_index() -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::new("unused"));
    for k in 0..12i64 {
        assert!(index.add(item(100 + k, axis_vector(1.0, 0.3 * k as f32))));
    }
    index
}

async fn mock_all_details(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/movie/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 100,
            "title": "Movie",
            "overview": "overview",
            "genres": [{"name": "Drama"}],
            "release_date": "2020-01-01",
            "vote_average": 7.5,
            "vote_count": 500
        })))
        .mount(server)
        .await;
}

fn fresh_user() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

fn engine_parts(
    pool: PgPool,
    index: Arc<VectorIndex>,
    server_uri: String,
) -> (RecommendationEngine, EmotionAnalyzer) {
    let embedder: Arc<dyn Embedder> = Arc::new(CannedEmbedder {
        responses: HashMap::from([("cheer me up".to_string(), axis_vector(1.0, 0.0))]),
    });
    let metadata = Arc::new(MetadataClient::with_base_url("k".into(), server_uri, None));
    let ratings = Arc::new(RatingStore::new(pool.clone()));
    let profiles = Arc::new(ProfileStore::new(pool.clone()));
    let rec_log = Arc::new(RecommendationLogStore::new(pool));

    let engine = RecommendationEngine::new(
        index.clone(),
        embedder.clone(),
        metadata,
        None,
        ratings.clone(),
        profiles.clone(),
        rec_log,
    );
    let analyzer = EmotionAnalyzer::new(embedder, index, profiles, ratings);

    (engine, analyzer)
}

#[tokio::test]
async fn test_hybrid_without_profile_equals_current_emotion() {
    let Some(pool) = test_pool().await else {
        eprintln!("Skipping test: PostgreSQL not available");
        return;
    };
    let server = MockServer::start().await;
    mock_all_details(&server).await;

    let (engine, _) = engine_parts(pool, build_index(), server.uri());
    let user_id = fresh_user();

    let direct = engine
        .current_emotion(user_id, "cheer me up", ContentType::Movie, 1)
        .await
        .unwrap();
    let hybrid = engine
        .hybrid(user_id, "cheer me up", ContentType::Movie, 1)
        .await
        .unwrap();

    let direct_ids: Vec<i64> = direct.recommendations.iter().map(|r| r.tmdb_id).collect();
    let hybrid_ids: Vec<i64> = hybrid.recommendations.iter().map(|r| r.tmdb_id).collect();
    assert_eq!(direct_ids, hybrid_ids);
}

#[tokio::test]
async fn test_profile_based_without_history_is_no_profile() {
    let Some(pool) = test_pool().await else {
        eprintln!("Skipping test: PostgreSQL not available");
        return;
    };
    let server = MockServer::start().await;

    let (engine, _) = engine_parts(pool, build_index(), server.uri());

    let err = engine
        .profile_based(fresh_user(), ContentType::Movie)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NoProfile));
}

#[tokio::test]
async fn test_first_rating_builds_profile() {
    let Some(pool) = test_pool().await else {
        eprintln!("Skipping test: PostgreSQL not available");
        return;
    };
    let server = MockServer::start().await;
    mock_all_details(&server).await;

    let index = build_index();
    let (_, analyzer) = engine_parts(pool, index.clone(), server.uri());
    let user_id = fresh_user();

    // Item 100 sits on the first axis
    let profile = analyzer
        .update_profile(user_id, 100, 8, ContentType::Movie)
        .await
        .unwrap();

    assert_eq!(profile.watched_count, 1);
    assert!((profile.confidence - 0.05).abs() < 1e-6);

    // A single positive rating seeds the profile with the item's direction
    let embedding = profile.embedding.unwrap();
    let expected = axis_vector(1.0, 0.0);
    for (a, b) in embedding.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-5);
    }

    // The stored profile round-trips through the read path
    let read_back = analyzer.profile_of(user_id).await.unwrap();
    assert_eq!(read_back.watched_count, 1);

    // A second rating advances the counter and re-normalizes
    let profile = analyzer
        .update_profile(user_id, 103, 10, ContentType::Movie)
        .await
        .unwrap();
    assert_eq!(profile.watched_count, 2);
    assert!((profile.confidence - 0.1).abs() < 1e-6);
    let norm = mood_gateway_core::l2_norm(&profile.embedding.unwrap());
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_current_emotion_excludes_rated_titles() {
    let Some(pool) = test_pool().await else {
        eprintln!("Skipping test: PostgreSQL not available");
        return;
    };
    let server = MockServer::start().await;
    mock_all_details(&server).await;

    let (engine, analyzer) = engine_parts(pool.clone(), build_index(), server.uri());
    let user_id = fresh_user();

    let ratings = RatingStore::new(pool);
    ratings
        .upsert(&mood_gateway_core::UserRating {
            user_id,
            tmdb_id: 100,
            content_type: ContentType::Movie,
            rating: 9,
            comment: None,
            created_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    // Keep the analyzer exercised alongside the raw store write
    analyzer
        .update_profile(user_id, 100, 9, ContentType::Movie)
        .await
        .unwrap();

    let envelope = engine
        .current_emotion(user_id, "cheer me up", ContentType::Movie, 1)
        .await
        .unwrap();

    assert_eq!(envelope.total, 11);
    assert!(envelope.recommendations.iter().all(|r| r.tmdb_id != 100));
}
