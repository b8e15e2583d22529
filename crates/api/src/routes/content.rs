//! Catalogue passthrough endpoints
//!
//! Thin adapters over the metadata provider: title details (with the
//! pre-warmed public-similar envelope), credits, watch providers, search
//! and filtered discovery.

use actix_web::{web, HttpResponse};
use mood_gateway_catalog::DiscoverFilters;
use mood_gateway_core::{ContentType, GatewayError};
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

use crate::state::AppState;

/// TTL of the on-demand `{detail, similar}` envelope, matching the prewarm
/// job.
const DETAILS_SIMILAR_TTL_SECS: u64 = 86_400;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/content")
            .route("/search", web::get().to(search))
            .route("/discover", web::get().to(discover))
            .route("/{content_type}/{tmdb_id}", web::get().to(details))
            .route("/{content_type}/{tmdb_id}/credits", web::get().to(credits))
            .route(
                "/{content_type}/{tmdb_id}/providers",
                web::get().to(watch_providers),
            )
            .route(
                "/{content_type}/{tmdb_id}/details-similar",
                web::get().to(details_similar),
            ),
    );
}

fn parse_path(path: (String, i64)) -> Result<(ContentType, i64), GatewayError> {
    let content_type = ContentType::from_str(&path.0).map_err(GatewayError::Validation)?;
    Ok((content_type, path.1))
}

async fn details(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, GatewayError> {
    let (content_type, tmdb_id) = parse_path(path.into_inner())?;

    let response = state.metadata.details(content_type, tmdb_id).await;
    if !response.success {
        return Err(GatewayError::NotFound(format!(
            "{} {}",
            content_type, tmdb_id
        )));
    }
    Ok(HttpResponse::Ok().json(response.data))
}

async fn credits(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, GatewayError> {
    let (content_type, tmdb_id) = parse_path(path.into_inner())?;

    let response = state.metadata.credits(content_type, tmdb_id).await;
    if !response.success {
        return Err(GatewayError::NotFound(format!(
            "credits for {} {}",
            content_type, tmdb_id
        )));
    }
    Ok(HttpResponse::Ok().json(response.data))
}

async fn watch_providers(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, GatewayError> {
    let (content_type, tmdb_id) = parse_path(path.into_inner())?;

    let response = state.metadata.watch_providers(content_type, tmdb_id).await;
    if !response.success {
        return Err(GatewayError::NotFound(format!(
            "providers for {} {}",
            content_type, tmdb_id
        )));
    }
    Ok(HttpResponse::Ok().json(response.data))
}

/// Title details together with the anonymous "similar" page. Served from
/// the pre-warmed cache when the scheduler has been there first.
async fn details_similar(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> Result<HttpResponse, GatewayError> {
    let (content_type, tmdb_id) = parse_path(path.into_inner())?;
    let key = format!("tmdb:{}:{}:details_similar_public", content_type, tmdb_id);

    if let Some(cache) = &state.cache {
        match cache.get_json::<serde_json::Value>(&key).await {
            Ok(Some(cached)) => return Ok(HttpResponse::Ok().json(cached)),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Prewarm cache read failed"),
        }
    }

    let detail = state.metadata.details(content_type, tmdb_id).await;
    if !detail.success {
        return Err(GatewayError::NotFound(format!(
            "{} {}",
            content_type, tmdb_id
        )));
    }

    let overview = detail
        .data
        .get("overview")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let similar = state
        .recommendations
        .emotion_public(overview, content_type, 1, &[tmdb_id])
        .await?;

    let payload = serde_json::json!({
        "detail": detail.data,
        "similar": similar,
    });

    if let Some(cache) = &state.cache {
        if let Err(e) = cache.set_json(&key, &payload, DETAILS_SIMILAR_TTL_SECS).await {
            warn!(key = %key, error = %e, "Prewarm cache write failed");
        }
    }

    Ok(HttpResponse::Ok().json(payload))
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    content_type: ContentType,
    query: String,
    #[serde(default = "default_page")]
    page: u32,
}

async fn search(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, GatewayError> {
    if query.query.trim().is_empty() {
        return Err(GatewayError::Validation("query must not be empty".into()));
    }

    let response = state
        .metadata
        .search(query.content_type, &query.query, query.page)
        .await;
    if !response.success {
        return Err(GatewayError::Transient(format!(
            "search failed with status {}",
            response.status_code
        )));
    }
    Ok(HttpResponse::Ok().json(response.data))
}

#[derive(Debug, Deserialize)]
struct DiscoverQuery {
    content_type: ContentType,
    #[serde(default = "default_page")]
    page: u32,
    with_genres: Option<String>,
    primary_release_year: Option<i32>,
    first_air_date_year: Option<i32>,
    #[serde(rename = "primary_release_date.gte")]
    primary_release_date_gte: Option<String>,
    #[serde(rename = "first_air_date.gte")]
    first_air_date_gte: Option<String>,
    #[serde(rename = "vote_average.gte")]
    vote_average_gte: Option<f32>,
    sort_by: Option<String>,
}

async fn discover(
    state: web::Data<AppState>,
    query: web::Query<DiscoverQuery>,
) -> Result<HttpResponse, GatewayError> {
    let filters = DiscoverFilters {
        with_genres: query.with_genres.clone(),
        primary_release_year: query.primary_release_year,
        first_air_date_year: query.first_air_date_year,
        primary_release_date_gte: query.primary_release_date_gte.clone(),
        first_air_date_gte: query.first_air_date_gte.clone(),
        vote_average_gte: query.vote_average_gte,
        sort_by: query.sort_by.clone(),
    };

    let response = state
        .metadata
        .discover(query.content_type, query.page, &filters)
        .await;
    if !response.success {
        return Err(GatewayError::Transient(format!(
            "discover failed with status {}",
            response.status_code
        )));
    }
    Ok(HttpResponse::Ok().json(response.data))
}
