use crate::error::ServerResult;
use crate::state::ServerState;
use artdeco::RepositoryStats;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health check endpoint (liveness)
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "artdeco-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness check endpoint
///
/// The repository is opened before the listener binds, so a running server
/// always has its store and indexes loaded.
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let stats = state.repository.stats();

    Ok(Json(json!({
        "status": "ready",
        "service": "artdeco-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "api": "ready",
            "repository": "ready",
            "vector_index": if stats.ann_active { "ann" } else { "exact" },
        }
    })))
}

/// Statistics response
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub version: String,
    pub uptime_seconds: u64,
    #[serde(flatten)]
    pub repository: RepositoryStats,
}

/// Repository counters
pub async fn stats(State(state): State<Arc<ServerState>>) -> ServerResult<Json<StatsResponse>> {
    Ok(Json(StatsResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_seconds(),
        repository: state.repository.stats(),
    }))
}
