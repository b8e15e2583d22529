//! Route registration and request validation smoke tests
//!
//! Builds the full application against stub subsystems (no database, cache
//! or encoder model needed) and exercises the HTTP surface.

use actix_web::{test, web, App};
use async_trait::async_trait;
use mood_gateway_api::{routes, AppState};
use mood_gateway_catalog::MetadataClient;
use mood_gateway_core::GatewayError;
use mood_gateway_engine::{
    CatalogIngester, Embedder, EmotionAnalyzer, ProfileStore, RatingStore, RecommendationEngine,
    RecommendationLogStore, VectorIndex, WatchlistStore, EMBEDDING_DIM,
};
use mood_gateway_rooms::{RoomEngine, RoomHub, RoomStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Embedder that encodes everything to the zero vector.
struct ZeroEmbedder;

#[async_trait]
impl Embedder for ZeroEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, GatewayError> {
        Ok(vec![0.0; EMBEDDING_DIM])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        Ok(vec![vec![0.0; EMBEDDING_DIM]; texts.len()])
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }
}

fn test_state() -> Arc<AppState> {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgresql://localhost/unused")
        .expect("lazy pool");

    let embedder: Arc<dyn Embedder> = Arc::new(ZeroEmbedder);
    let metadata = Arc::new(MetadataClient::with_base_url(
        "k".into(),
        "http://127.0.0.1:1".into(),
        None,
    ));
    let index = Arc::new(VectorIndex::new("unused"));
    let ratings = Arc::new(RatingStore::new(pool.clone()));
    let profiles = Arc::new(ProfileStore::new(pool.clone()));
    let rec_log = Arc::new(RecommendationLogStore::new(pool.clone()));

    let recommendations = Arc::new(RecommendationEngine::new(
        index.clone(),
        embedder.clone(),
        metadata.clone(),
        None,
        ratings.clone(),
        profiles.clone(),
        rec_log,
    ));
    let analyzer = Arc::new(EmotionAnalyzer::new(
        embedder.clone(),
        index.clone(),
        profiles,
        ratings,
    ));
    let ingester = Arc::new(CatalogIngester::new(
        metadata.clone(),
        Arc::new(mood_gateway_catalog::ContentStore::new(pool.clone())),
        index.clone(),
        embedder.clone(),
        None,
    ));
    let rooms = Arc::new(RoomEngine::new(
        RoomStore::new(pool.clone()),
        index.clone(),
        embedder,
    ));

    Arc::new(AppState {
        recommendations,
        analyzer,
        ingester,
        watchlist: Arc::new(WatchlistStore::new(pool.clone())),
        rooms,
        hub: Arc::new(RoomHub::new()),
        index,
        metadata,
        cache: None,
        pool,
    })
}

macro_rules! test_app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::from(test_state()))
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_hybrid_requires_user_header() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/recommendations/hybrid?page=1")
        .set_json(serde_json::json!({
            "emotion_text": "cheer me up",
            "content_type": "movie"
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_public_current_emotion_with_empty_index() {
    let app = test_app!();

    // No user header: the anonymous mode answers without touching storage
    let req = test::TestRequest::post()
        .uri("/recommendations/current-emotion")
        .set_json(serde_json::json!({
            "emotion": "I feel sad and lonely tonight",
            "content_type": "movie",
            "page": 1
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn test_create_room_rejects_out_of_range_values() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/rooms")
        .set_json(serde_json::json!({
            "content_type": "movie",
            "max_participants": 9,
            "duration_minutes": 10,
            "creator_session_id": "abc"
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_unknown_content_type_in_path_is_rejected() {
    let app = test_app!();

    let req = test::TestRequest::get()
        .uri("/content/anime/42")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_emotion_analyze_validates_text() {
    let app = test_app!();

    let req = test::TestRequest::post()
        .uri("/emotion/analyze")
        .set_json(serde_json::json!({ "text": "" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Valid text, zero embedding: analysis still answers with confidence 0
    let req = test::TestRequest::post()
        .uri("/emotion/analyze")
        .set_json(serde_json::json!({ "text": "melancholic but hopeful" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["confidence"], 0.0);
    assert_eq!(body["recognized"], false);
}

#[actix_web::test]
async fn test_watchlist_requires_user_header() {
    let app = test_app!();

    let req = test::TestRequest::get().uri("/watchlist").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}
