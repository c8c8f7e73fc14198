use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::warn;

use cache::CacheStatus;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` when the database answers, `degraded` otherwise.
    pub status: &'static str,
    pub backend_response_time_ms: f64,
    pub database: &'static str,
    pub cache: CacheStatus,
    pub llm: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let started = Instant::now();

    let database_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "database health check failed");
            false
        }
    };
    let cache = state.cache.status().await;
    let llm = if state.transform.is_available() {
        "gemini_configured"
    } else {
        "gemini_not_configured"
    };

    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    Json(HealthResponse {
        status: if database_ok { "ok" } else { "degraded" },
        backend_response_time_ms: (elapsed_ms * 100.0).round() / 100.0,
        database: if database_ok { "connected" } else { "disconnected" },
        cache,
        llm,
    })
}
