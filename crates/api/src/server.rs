//! HTTP server assembly

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use tracing::info;
use tracing_actix_web::TracingLogger;

use crate::health;
use crate::routes;
use crate::state::AppState;

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "mood-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "index": state.index.stats(),
    }))
}

/// Bind and run the HTTP server until shutdown.
pub async fn run(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    info!(host, port, "Starting HTTP server");

    let data = web::Data::from(state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .route("/health", web::get().to(health_check))
            .route("/health/detailed", web::get().to(health::detailed))
            .configure(routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
