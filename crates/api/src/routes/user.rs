//! Rating and watchlist endpoints
//!
//! Ratings feed the emotional profile: every accepted rating shifts the
//! user's embedding through the incremental weighted average.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use mood_gateway_core::{
    ContentType, GatewayError, RecommendationKind, UserRating, WatchStatus, WatchlistEntry,
};
use serde::Deserialize;
use validator::Validate;

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/content/rate", web::post().to(rate_content))
        .route("/emotion/analyze", web::post().to(analyze_emotion))
        .route("/emotion/profile", web::get().to(emotional_profile))
        .route("/watchlist", web::post().to(add_watchlist_entry))
        .route("/watchlist", web::get().to(list_watchlist));
}

fn user_id(req: &HttpRequest) -> Result<i64, GatewayError> {
    req.headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| GatewayError::Validation("X-User-Id header required".into()))
}

#[derive(Debug, Deserialize, Validate)]
struct RateRequest {
    tmdb_id: i64,
    content_type: ContentType,
    #[validate(range(min = 1, max = 10))]
    rating: i32,
    #[validate(length(max = 2000))]
    comment: Option<String>,
}

async fn rate_content(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<RateRequest>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let user_id = user_id(&req)?;

    let profile = state
        .analyzer
        .record_rating(&UserRating {
            user_id,
            tmdb_id: body.tmdb_id,
            content_type: body.content_type,
            rating: body.rating,
            comment: body.comment.clone(),
            created_at: Utc::now(),
        })
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "watched_count": profile.watched_count,
        "confidence": profile.confidence,
    })))
}

#[derive(Debug, Deserialize, Validate)]
struct AnalyzeRequest {
    #[validate(length(min = 1, max = 500))]
    text: String,
}

async fn analyze_emotion(
    state: web::Data<AppState>,
    body: web::Json<AnalyzeRequest>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let analysis = state.analyzer.analyze(&body.text).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "confidence": analysis.confidence,
        "dimension": analysis.embedding.len(),
        "recognized": analysis.embedding.iter().any(|&x| x != 0.0),
    })))
}

async fn emotional_profile(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let user_id = user_id(&req)?;
    let characteristics = state.analyzer.characteristics(user_id).await?;
    Ok(HttpResponse::Ok().json(characteristics))
}

#[derive(Debug, Deserialize, Validate)]
struct WatchlistRequest {
    tmdb_id: i64,
    content_type: ContentType,
    status: Option<WatchStatus>,
    #[serde(default)]
    from_recommendation: bool,
    recommendation_type: Option<RecommendationKind>,
    recommendation_score: Option<f32>,
}

async fn add_watchlist_entry(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<WatchlistRequest>,
) -> Result<HttpResponse, GatewayError> {
    let user_id = user_id(&req)?;

    let entry = WatchlistEntry {
        user_id,
        tmdb_id: body.tmdb_id,
        content_type: body.content_type,
        status: body.status.unwrap_or(WatchStatus::ToWatch),
        from_recommendation: body.from_recommendation,
        recommendation_type: body.recommendation_type,
        recommendation_score: body.recommendation_score,
        added_at: Utc::now(),
    };
    state.watchlist.upsert(&entry).await?;

    Ok(HttpResponse::Created().json(entry))
}

async fn list_watchlist(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let user_id = user_id(&req)?;
    let entries = state.watchlist.for_user(user_id).await?;
    Ok(HttpResponse::Ok().json(entries))
}
