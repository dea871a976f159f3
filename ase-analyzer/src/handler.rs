//! Ingestion handler: decode → score → store ‖ publish
//!
//! Each delivery is processed on its own; nothing is retained between
//! messages apart from the shared counters. Storing the result and publishing
//! the notification run concurrently and succeed or fail independently.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use ase_common::config::MessagingConfig;
use ase_common::models::{decode_payload, decode_value};
use ase_common::{AnalyzedNotification, DecodeError, InboundMessage, ResultDocument};

use crate::db::ResultStore;
use crate::error::{AnalyzerError, Result};
use crate::messaging::{frontend_label, NotificationPublisher};
use crate::scorer::SentimentScorer;
use crate::stats::PipelineStats;

/// What happened to one delivery
#[derive(Debug)]
pub enum Outcome {
    /// Payload was not a usable tweet record; nothing was written or published
    Dropped(DecodeError),
    /// Scorer failed; nothing was written or published
    ScoreFailed(AnalyzerError),
    /// Scored; the store and publish results are reported separately
    Processed {
        sentiment: f64,
        stored: Result<()>,
        published: Result<()>,
    },
}

impl Outcome {
    /// True when the result was stored and the notification published
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Outcome::Processed {
                stored: Ok(()),
                published: Ok(()),
                ..
            }
        )
    }
}

pub struct IngestionHandler {
    scorer: Arc<dyn SentimentScorer>,
    store: Arc<dyn ResultStore>,
    publisher: Arc<dyn NotificationPublisher>,
    analyzed_topic: String,
    notification_ttl: Duration,
    stats: Arc<PipelineStats>,
}

impl IngestionHandler {
    pub fn new(
        scorer: Arc<dyn SentimentScorer>,
        store: Arc<dyn ResultStore>,
        publisher: Arc<dyn NotificationPublisher>,
        messaging: &MessagingConfig,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            scorer,
            store,
            publisher,
            analyzed_topic: messaging.analyzed_topic.clone(),
            notification_ttl: Duration::from_millis(messaging.notification_ttl_ms),
            stats,
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Handle a raw delivery body
    pub async fn handle_delivery(&self, payload: &[u8]) -> Outcome {
        match decode_payload(payload) {
            Ok(message) => self.process(message).await,
            Err(e) => self.drop_message(e, &String::from_utf8_lossy(payload)).await,
        }
    }

    /// Handle a payload that is already structured
    pub async fn handle_value(&self, payload: Value) -> Outcome {
        let shown = payload.to_string();
        match decode_value(payload) {
            Ok(message) => self.process(message).await,
            Err(e) => self.drop_message(e, &shown).await,
        }
    }

    async fn drop_message(&self, reason: DecodeError, payload: &str) -> Outcome {
        error!("Bad data received: {} ({})", payload, reason);
        self.stats.record_dropped(format!("bad data: {}", reason)).await;
        Outcome::Dropped(reason)
    }

    async fn process(&self, message: InboundMessage) -> Outcome {
        let tweet = message.tweet;

        let sentiment = match self.scorer.score(&tweet.text).await {
            Ok(score) => score,
            Err(e) => {
                error!("Failed to score tweet for '{}': {}", tweet.phrase, e);
                self.stats.record_score_failure(e.to_string()).await;
                return Outcome::ScoreFailed(e);
            }
        };

        let result = ResultDocument::scored(&tweet, sentiment);
        let notification = AnalyzedNotification::new(&tweet, frontend_label(self.publisher.client_id()));

        if let Ok(json) = serde_json::to_string(&notification) {
            info!("Sending message: {}", json);
        }

        let (stored, published) = tokio::join!(
            self.store.insert_result(&result),
            self.publisher
                .publish(&self.analyzed_topic, &notification, self.notification_ttl),
        );

        if let Err(e) = &stored {
            error!("Failed to store result for '{}': {}", tweet.phrase, e);
            self.stats.record_store_failure(format!("store failed: {}", e)).await;
        }
        if let Err(e) = &published {
            error!("Failed to publish notification for '{}': {}", tweet.phrase, e);
            self.stats
                .record_publish_failure(format!("publish failed: {}", e))
                .await;
        }

        self.stats.record_processed();

        Outcome::Processed {
            sentiment,
            stored,
            published,
        }
    }
}
