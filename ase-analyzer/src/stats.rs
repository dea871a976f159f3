//! Pipeline counters shared by the handler, the subscription and `/health`

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// Process-wide pipeline statistics
#[derive(Debug, Default)]
pub struct PipelineStats {
    processed: AtomicU64,
    dropped: AtomicU64,
    score_failures: AtomicU64,
    store_failures: AtomicU64,
    publish_failures: AtomicU64,
    subscribed: AtomicBool,
    last_error: RwLock<Option<String>>,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub subscribed: bool,
    pub processed: u64,
    pub dropped: u64,
    pub score_failures: u64,
    pub store_failures: u64,
    pub publish_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::SeqCst);
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_dropped(&self, reason: impl Into<String>) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.record_error(reason).await;
    }

    pub async fn record_score_failure(&self, reason: impl Into<String>) {
        self.score_failures.fetch_add(1, Ordering::Relaxed);
        self.record_error(reason).await;
    }

    pub async fn record_store_failure(&self, reason: impl Into<String>) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
        self.record_error(reason).await;
    }

    pub async fn record_publish_failure(&self, reason: impl Into<String>) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
        self.record_error(reason).await;
    }

    pub async fn record_error(&self, reason: impl Into<String>) {
        *self.last_error.write().await = Some(reason.into());
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            subscribed: self.is_subscribed(),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            score_failures: self.score_failures.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            last_error: self.last_error.read().await.clone(),
        }
    }
}
