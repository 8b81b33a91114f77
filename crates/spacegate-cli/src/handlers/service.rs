//! Service-level handlers

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// GET|HEAD / - Health check
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "spacegate",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
