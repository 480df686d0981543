pub mod featured;
pub mod webhooks;

use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Every route the service exposes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Featured purchase flow (caller identity from the auth gateway)
        .merge(featured::router())
        // Webhook endpoints (signature auth)
        .merge(webhooks::router())
}
