//! API route handlers
//!
//! - `health`: liveness, readiness and repository statistics
//! - `items`: artwork item CRUD, similarity search and text lookup

pub mod health;
pub mod items;

use crate::error::ServerError;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// Root endpoint (GET /), kept for clients that probe it as a health check.
pub async fn root() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}

/// 404 Not Found handler
pub async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}
