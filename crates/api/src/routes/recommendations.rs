//! Recommendation endpoints

use actix_web::{web, HttpRequest, HttpResponse};
use mood_gateway_core::{ContentType, GatewayError};
use serde::Deserialize;
use validator::Validate;

use crate::state::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/recommendations")
            .route("/current-emotion", web::post().to(current_emotion))
            .route("/hybrid", web::post().to(hybrid))
            .route("/history", web::post().to(history))
            .route("/profile-based", web::post().to(profile_based))
            .route(
                "/admin/embedding/bulk-popular/continue",
                web::post().to(bulk_popular_continue),
            ),
    );
}

/// Authenticated user id; JWT verification happens upstream and the
/// resolved id arrives in `X-User-Id`.
fn user_id(req: &HttpRequest) -> Result<i64, GatewayError> {
    req.headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| GatewayError::Validation("X-User-Id header required".into()))
}

fn optional_user_id(req: &HttpRequest) -> Option<i64> {
    user_id(req).ok()
}

fn default_page() -> usize {
    1
}

#[derive(Debug, Deserialize, Validate)]
struct CurrentEmotionRequest {
    #[validate(length(min = 1, max = 500))]
    emotion: String,
    content_type: ContentType,
    #[serde(default = "default_page")]
    page: usize,
}

async fn current_emotion(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CurrentEmotionRequest>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;

    let envelope = match optional_user_id(&req) {
        Some(user_id) => {
            state
                .recommendations
                .current_emotion(user_id, &body.emotion, body.content_type, body.page)
                .await?
        }
        None => {
            state
                .recommendations
                .emotion_public(&body.emotion, body.content_type, body.page, &[])
                .await?
        }
    };

    Ok(HttpResponse::Ok().json(envelope))
}

#[derive(Debug, Deserialize, Validate)]
struct HybridRequest {
    #[validate(length(min = 1, max = 500))]
    emotion_text: String,
    content_type: ContentType,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "default_page")]
    page: usize,
}

async fn hybrid(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<HybridRequest>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, GatewayError> {
    body.validate()
        .map_err(|e| GatewayError::Validation(e.to_string()))?;
    let user_id = user_id(&req)?;

    let envelope = state
        .recommendations
        .hybrid(user_id, &body.emotion_text, body.content_type, query.page)
        .await?;
    Ok(HttpResponse::Ok().json(envelope))
}

#[derive(Debug, Deserialize)]
struct ContentTypeQuery {
    content_type: ContentType,
}

async fn history(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ContentTypeQuery>,
) -> Result<HttpResponse, GatewayError> {
    let user_id = user_id(&req)?;

    let envelope = state
        .recommendations
        .history_based(user_id, query.content_type)
        .await?;
    Ok(HttpResponse::Ok().json(envelope))
}

async fn profile_based(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ContentTypeQuery>,
) -> Result<HttpResponse, GatewayError> {
    let user_id = user_id(&req)?;

    let envelope = state
        .recommendations
        .profile_based(user_id, query.content_type)
        .await?;
    Ok(HttpResponse::Ok().json(envelope))
}

#[derive(Debug, Deserialize)]
struct BulkPopularQuery {
    content_type: ContentType,
    batch_pages: Option<u32>,
}

async fn bulk_popular_continue(
    state: web::Data<AppState>,
    query: web::Query<BulkPopularQuery>,
) -> Result<HttpResponse, GatewayError> {
    let batch = query
        .batch_pages
        .unwrap_or(mood_gateway_engine::DEFAULT_BATCH_PAGES);

    let report = state
        .ingester
        .populate_continue(query.content_type, batch)
        .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "report": report,
        "index": state.index.stats(),
    })))
}
