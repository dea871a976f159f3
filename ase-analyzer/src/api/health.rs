//! Health check endpoint
//!
//! Reports liveness, deployment metadata and pipeline counters.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::stats::StatsSnapshot;
use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" once the subscription is active, "starting" before
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Platform instance index (-1 outside a managed platform)
    pub instance: i64,
    pub memory_limit_mb: u64,
    #[serde(flatten)]
    pub pipeline: StatsSnapshot,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let pipeline = state.stats.snapshot().await;

    Json(HealthResponse {
        status: if pipeline.subscribed { "ok" } else { "starting" }.to_string(),
        module: "ase-analyzer".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        instance: state.application.instance_index,
        memory_limit_mb: state.application.memory_limit_mb,
        pipeline,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
