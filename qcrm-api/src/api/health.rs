//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use qcrm_common::db::schema_version;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: i64,
    /// Schema version, or null when the database cannot be reached
    pub schema_version: Option<i32>,
}

/// GET /health
///
/// Does NOT require authentication. Reports `degraded` when the database
/// does not answer.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let schema_version = match schema_version(&state.db).await {
        Ok(version) => Some(version),
        Err(e) => {
            warn!("Health check could not reach database: {}", e);
            None
        }
    };

    Json(HealthResponse {
        status: if schema_version.is_some() { "ok" } else { "degraded" }.to_string(),
        module: "qcrm-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: (Utc::now() - state.startup_time).num_seconds(),
        schema_version,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
