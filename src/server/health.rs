use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub history_entries: usize,
    pub version: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");

    let uptime = state.start_time.elapsed().as_secs();

    let history_entries = match state.history.list().await {
        Ok(entries) => entries.len(),
        Err(e) => {
            tracing::warn!("Health check could not list history: {:#}", e);
            0
        }
    };

    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: uptime,
        history_entries,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (StatusCode::OK, Json(response))
}
