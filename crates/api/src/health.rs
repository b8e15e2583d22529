//! Aggregated health reporting
//!
//! `/health` answers liveness cheaply; `/health/detailed` probes every
//! dependency and degrades the overall status instead of failing the
//! request.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ComponentStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Serialize)]
struct DetailedHealth {
    status: ComponentStatus,
    database: ComponentStatus,
    cache: ComponentStatus,
    index_items: usize,
    version: &'static str,
}

pub async fn detailed(state: web::Data<AppState>) -> HttpResponse {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => ComponentStatus::Healthy,
        Err(_) => ComponentStatus::Unavailable,
    };

    let cache = match &state.cache {
        Some(cache) => match cache.health_check().await {
            Ok(true) => ComponentStatus::Healthy,
            _ => ComponentStatus::Unavailable,
        },
        None => ComponentStatus::Degraded,
    };

    let status = match (database, cache) {
        (ComponentStatus::Healthy, ComponentStatus::Healthy) => ComponentStatus::Healthy,
        (ComponentStatus::Unavailable, _) => ComponentStatus::Unavailable,
        _ => ComponentStatus::Degraded,
    };

    let report = DetailedHealth {
        status,
        database,
        cache,
        index_items: state.index.len(),
        version: env!("CARGO_PKG_VERSION"),
    };

    let mut response = match status {
        ComponentStatus::Unavailable => HttpResponse::ServiceUnavailable(),
        _ => HttpResponse::Ok(),
    };
    response.json(report)
}
