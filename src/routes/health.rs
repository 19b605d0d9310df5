//! Liveness/readiness probes and the cache administration endpoints.
//! The cache endpoints are deliberately unauthenticated to match the
//! observed contract; restrict them before any real production use.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::{error::AppResult, state::AppState};

pub async fn health_check() -> Response {
    Json(json!({ "status": "healthy" })).into_response()
}

/// Full readiness: database and cache round-trips.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> Response {
    let mut errors: Vec<String> = Vec::new();

    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(e) => {
            error!("Database health check failed: {e}");
            errors.push(format!("Database: {e}"));
            "error"
        }
    };

    let cache = if state.cache.health_roundtrip().await {
        "connected"
    } else {
        errors.push("Cache: Unable to read/write".to_string());
        "error"
    };

    if errors.is_empty() {
        Json(json!({
            "status": "healthy",
            "database": database,
            "cache": cache,
        }))
        .into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "database": database,
                "cache": cache,
                "errors": errors,
            })),
        )
            .into_response()
    }
}

pub async fn cache_stats(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let stats = state.cache.stats().await;
    Ok(Json(json!({ "status": "ok", "cache": stats })).into_response())
}

pub async fn clear_cache(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    state.cache.clear().await;
    Ok(Json(json!({ "status": "ok", "message": "Cache cleared successfully" })).into_response())
}
