//! ase-analyzer library - sentiment analysis relay
//!
//! Subscribes to the tweets topic, scores each record, appends the result to
//! the document store and announces it on the analyzed topic. The HTTP side
//! only serves static assets and `/health`.

pub mod api;
pub mod db;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod messaging;
pub mod scorer;
pub mod stats;

pub use crate::error::{AnalyzerError, Result};

use axum::Router;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use ase_common::config::ApplicationInfo;

use crate::stats::PipelineStats;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Pipeline counters, shared with the ingestion handler
    pub stats: Arc<PipelineStats>,
    /// Deployment metadata reported by `/health`
    pub application: ApplicationInfo,
    /// Directory served for unrouted paths
    pub static_dir: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(stats: Arc<PipelineStats>, application: ApplicationInfo, static_dir: PathBuf) -> Self {
        Self {
            stats,
            application,
            static_dir,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let static_files = api::static_service(&state.static_dir);

    Router::new()
        .merge(api::health_routes())
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
