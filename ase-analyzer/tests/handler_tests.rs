//! Ingestion handler and subscription loop tests
//!
//! Tests cover:
//! - One result document and one notification per valid tweet
//! - Structured and JSON-encoded payloads behave identically
//! - Missing `tweet`/`text` drops the message with no side effects
//! - Store and publish failures are reported independently
//! - The delivery loop handles every payload before returning, without
//!   holding deliveries back at the credit value
//!
//! The store, publisher and scorer are in-memory fakes; no broker or
//! database is required.

use async_trait::async_trait;
use futures::stream;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ase_analyzer::db::ResultStore;
use ase_analyzer::handler::{IngestionHandler, Outcome};
use ase_analyzer::messaging::{drive_deliveries, NotificationPublisher};
use ase_analyzer::scorer::SentimentScorer;
use ase_analyzer::stats::PipelineStats;
use ase_analyzer::{AnalyzerError, Result};
use ase_common::config::MessagingConfig;
use ase_common::{AnalyzedNotification, ResultDocument};

// =============================================================================
// Fakes
// =============================================================================

struct FixedScorer(f64);

#[async_trait]
impl SentimentScorer for FixedScorer {
    async fn score(&self, _text: &str) -> Result<f64> {
        Ok(self.0)
    }
}

struct FailingScorer;

#[async_trait]
impl SentimentScorer for FailingScorer {
    async fn score(&self, _text: &str) -> Result<f64> {
        Err(AnalyzerError::Scoring("lexicon unavailable".to_string()))
    }
}

#[derive(Default)]
struct RecordingStore {
    inserted: Mutex<Vec<ResultDocument>>,
    fail: bool,
}

#[async_trait]
impl ResultStore for RecordingStore {
    async fn insert_result(&self, result: &ResultDocument) -> Result<()> {
        if self.fail {
            return Err(AnalyzerError::Store("store offline".to_string()));
        }
        self.inserted.lock().unwrap().push(result.clone());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    sent: Mutex<Vec<(String, AnalyzedNotification, Duration)>>,
    fail: bool,
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    fn client_id(&self) -> &str {
        "AUTO_test001"
    }

    async fn publish(&self, topic: &str, notification: &AnalyzedNotification, ttl: Duration) -> Result<()> {
        if self.fail {
            return Err(AnalyzerError::Publish("broker rejected notification".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_string(), notification.clone(), ttl));
        Ok(())
    }
}

/// Holds every insert until `parties` inserts are waiting at once
struct GatedStore {
    gate: tokio::sync::Barrier,
}

#[async_trait]
impl ResultStore for GatedStore {
    async fn insert_result(&self, _result: &ResultDocument) -> Result<()> {
        self.gate.wait().await;
        Ok(())
    }
}

struct Harness {
    handler: Arc<IngestionHandler>,
    store: Arc<RecordingStore>,
    publisher: Arc<RecordingPublisher>,
    stats: Arc<PipelineStats>,
}

fn harness_with(scorer: Arc<dyn SentimentScorer>, store: RecordingStore, publisher: RecordingPublisher) -> Harness {
    let store = Arc::new(store);
    let publisher = Arc::new(publisher);
    let stats = Arc::new(PipelineStats::new());
    let handler = Arc::new(IngestionHandler::new(
        scorer,
        store.clone(),
        publisher.clone(),
        &MessagingConfig::default(),
        stats.clone(),
    ));
    Harness {
        handler,
        store,
        publisher,
        stats,
    }
}

fn harness(score: f64) -> Harness {
    harness_with(
        Arc::new(FixedScorer(score)),
        RecordingStore::default(),
        RecordingPublisher::default(),
    )
}

fn coffee() -> Value {
    json!({"tweet": {"phrase": "coffee", "text": "I love coffee", "date": "2024-01-01"}})
}

// =============================================================================
// Handler
// =============================================================================

#[tokio::test]
async fn test_coffee_scenario() {
    let h = harness(2.0);

    let outcome = h.handler.handle_delivery(coffee().to_string().as_bytes()).await;
    assert!(outcome.is_complete(), "unexpected outcome: {:?}", outcome);

    let inserted = h.store.inserted.lock().unwrap().clone();
    assert_eq!(inserted.len(), 1);
    assert_eq!(
        serde_json::to_value(&inserted[0]).unwrap(),
        json!({"phrase": "coffee", "text": "I love coffee", "date": "2024-01-01", "sentiment": 2.0})
    );

    let sent = h.publisher.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    let (topic, notification, ttl) = &sent[0];
    assert_eq!(topic, "mqlight/ase/analyzed");
    assert_eq!(
        serde_json::to_value(notification).unwrap(),
        json!({"analyzed": {"phrase": "coffee", "date": "2024-01-01"}, "frontend": "Rust: AUTO_test001"})
    );
    assert_eq!(ttl.as_millis(), 3_600_000);

    let snapshot = h.stats.snapshot().await;
    assert_eq!(snapshot.processed, 1);
    assert_eq!(snapshot.dropped, 0);
}

#[tokio::test]
async fn test_structured_and_encoded_payloads_are_equivalent() {
    let structured = harness(-1.5);
    let encoded = harness(-1.5);

    structured.handler.handle_value(coffee()).await;
    encoded
        .handler
        .handle_value(Value::String(coffee().to_string()))
        .await;

    assert_eq!(
        *structured.store.inserted.lock().unwrap(),
        *encoded.store.inserted.lock().unwrap()
    );
    assert_eq!(
        *structured.publisher.sent.lock().unwrap(),
        *encoded.publisher.sent.lock().unwrap()
    );
    assert_eq!(structured.store.inserted.lock().unwrap()[0].sentiment, -1.5);
}

#[tokio::test]
async fn test_double_encoded_delivery_body() {
    let h = harness(1.0);
    let body = serde_json::to_vec(&coffee().to_string()).unwrap();

    let outcome = h.handler.handle_delivery(&body).await;

    assert!(outcome.is_complete());
    assert_eq!(h.store.inserted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_tweet_is_dropped() {
    let h = harness(2.0);

    let outcome = h.handler.handle_delivery(br#"{"status": "hello"}"#).await;

    assert!(matches!(outcome, Outcome::Dropped(_)));
    assert!(h.store.inserted.lock().unwrap().is_empty());
    assert!(h.publisher.sent.lock().unwrap().is_empty());

    let snapshot = h.stats.snapshot().await;
    assert_eq!(snapshot.dropped, 1);
    assert_eq!(snapshot.processed, 0);
    assert!(snapshot.last_error.unwrap().contains("tweet"));
}

#[tokio::test]
async fn test_missing_text_is_dropped() {
    let h = harness(2.0);

    let outcome = h
        .handler
        .handle_value(json!({"tweet": {"phrase": "coffee", "date": "2024-01-01"}}))
        .await;

    assert!(matches!(outcome, Outcome::Dropped(_)));
    assert!(h.store.inserted.lock().unwrap().is_empty());
    assert!(h.publisher.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_garbage_body_is_dropped() {
    let h = harness(2.0);

    let outcome = h.handler.handle_delivery(b"\xff\xfenot json").await;

    assert!(matches!(outcome, Outcome::Dropped(_)));
    assert_eq!(h.stats.snapshot().await.dropped, 1);
}

#[tokio::test]
async fn test_scorer_failure_produces_no_side_effects() {
    let h = harness_with(
        Arc::new(FailingScorer),
        RecordingStore::default(),
        RecordingPublisher::default(),
    );

    let outcome = h.handler.handle_value(coffee()).await;

    assert!(matches!(outcome, Outcome::ScoreFailed(AnalyzerError::Scoring(_))));
    assert!(h.store.inserted.lock().unwrap().is_empty());
    assert!(h.publisher.sent.lock().unwrap().is_empty());
    assert_eq!(h.stats.snapshot().await.score_failures, 1);
}

#[tokio::test]
async fn test_store_failure_still_publishes() {
    let h = harness_with(
        Arc::new(FixedScorer(3.0)),
        RecordingStore {
            fail: true,
            ..Default::default()
        },
        RecordingPublisher::default(),
    );

    let outcome = h.handler.handle_value(coffee()).await;

    match outcome {
        Outcome::Processed {
            sentiment,
            stored,
            published,
        } => {
            assert_eq!(sentiment, 3.0);
            assert!(stored.is_err());
            assert!(published.is_ok());
        }
        other => panic!("Expected processed outcome, got {:?}", other),
    }
    assert_eq!(h.publisher.sent.lock().unwrap().len(), 1);

    let snapshot = h.stats.snapshot().await;
    assert_eq!(snapshot.store_failures, 1);
    assert_eq!(snapshot.processed, 1);
}

#[tokio::test]
async fn test_publish_failure_still_stores() {
    let h = harness_with(
        Arc::new(FixedScorer(0.0)),
        RecordingStore::default(),
        RecordingPublisher {
            fail: true,
            ..Default::default()
        },
    );

    let outcome = h.handler.handle_value(coffee()).await;

    assert!(matches!(
        outcome,
        Outcome::Processed {
            stored: Ok(()),
            published: Err(AnalyzerError::Publish(_)),
            ..
        }
    ));
    assert_eq!(h.store.inserted.lock().unwrap().len(), 1);
    assert_eq!(h.stats.snapshot().await.publish_failures, 1);
}

#[tokio::test]
async fn test_date_shape_is_preserved() {
    let h = harness(1.0);

    h.handler
        .handle_value(json!({"tweet": {"phrase": "tea", "text": "fine tea", "date": 1704067200000u64}}))
        .await;

    let inserted = h.store.inserted.lock().unwrap().clone();
    assert_eq!(inserted[0].date, json!(1704067200000u64));
    let sent = h.publisher.sent.lock().unwrap().clone();
    assert_eq!(sent[0].1.analyzed.date, json!(1704067200000u64));
}

// =============================================================================
// Delivery loop
// =============================================================================

#[tokio::test]
async fn test_delivery_loop_handles_every_payload() {
    let h = harness(1.0);
    h.stats.set_subscribed(true);

    let payloads: Vec<Result<Vec<u8>>> = vec![
        Ok(coffee().to_string().into_bytes()),
        Ok(br#"{"no": "tweet"}"#.to_vec()),
        Ok(json!({"tweet": {"phrase": "tea", "text": "tea is nice", "date": "2024-01-02"}})
            .to_string()
            .into_bytes()),
    ];

    drive_deliveries(stream::iter(payloads), h.handler.clone())
        .await
        .unwrap();

    let mut phrases: Vec<String> = h
        .store
        .inserted
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.phrase.clone())
        .collect();
    phrases.sort();
    assert_eq!(phrases, vec!["coffee", "tea"]);
    assert_eq!(h.publisher.sent.lock().unwrap().len(), 2);

    let snapshot = h.stats.snapshot().await;
    assert_eq!(snapshot.processed, 2);
    assert_eq!(snapshot.dropped, 1);
    assert!(!snapshot.subscribed, "ended stream marks subscription inactive");
}

#[tokio::test]
async fn test_delivery_loop_stops_on_stream_error() {
    let h = harness(1.0);

    let payloads: Vec<Result<Vec<u8>>> = vec![
        Ok(coffee().to_string().into_bytes()),
        Err(AnalyzerError::Publish("channel closed".to_string())),
        Ok(coffee().to_string().into_bytes()),
    ];

    let result = drive_deliveries(stream::iter(payloads), h.handler.clone()).await;

    assert!(result.is_err());
    // Payloads before the error are still completed
    assert_eq!(h.store.inserted.lock().unwrap().len(), 1);
    assert!(h.stats.snapshot().await.last_error.is_some());
}

#[tokio::test]
async fn test_delivery_loop_is_not_capped_at_credit() {
    // More payloads than the default credit, all held in the store together
    let credit = MessagingConfig::default().credit as usize;
    let parties = credit + 2;
    let stats = Arc::new(PipelineStats::new());
    let handler = Arc::new(IngestionHandler::new(
        Arc::new(FixedScorer(1.0)),
        Arc::new(GatedStore {
            gate: tokio::sync::Barrier::new(parties),
        }),
        Arc::new(RecordingPublisher::default()),
        &MessagingConfig::default(),
        stats.clone(),
    ));

    let payloads: Vec<Result<Vec<u8>>> = (0..parties)
        .map(|_| Ok(coffee().to_string().into_bytes()))
        .collect();

    tokio::time::timeout(Duration::from_secs(5), drive_deliveries(stream::iter(payloads), handler))
        .await
        .expect("deliveries beyond the credit window were held back")
        .unwrap();

    assert_eq!(stats.snapshot().await.processed, parties as u64);
}
