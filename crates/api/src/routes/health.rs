//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;

use linkcast_common::types::iso_timestamp;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let timestamp = iso_timestamp(Utc::now());

    match state.delivery.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "OK",
                "message": "Server is running",
                "timestamp": timestamp,
                "version": env!("CARGO_PKG_VERSION"),
                "pendingDeliveries": stats.pending,
                "connections": stats.connections,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "DEGRADED",
                "message": e.to_string(),
                "timestamp": timestamp,
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
    }
}
