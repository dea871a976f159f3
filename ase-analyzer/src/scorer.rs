//! Sentiment scoring
//!
//! The pipeline only needs "text in, number out"; [`AfinnScorer`] answers with
//! the summed AFINN lexicon score of the text.

use async_trait::async_trait;

use crate::error::{AnalyzerError, Result};

/// Scores a piece of text; positive is favourable, negative unfavourable
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<f64>;
}

/// AFINN-165 lexicon scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct AfinnScorer;

#[async_trait]
impl SentimentScorer for AfinnScorer {
    async fn score(&self, text: &str) -> Result<f64> {
        let text = text.to_owned();
        let analysis = tokio::task::spawn_blocking(move || sentiment::analyze(text))
            .await
            .map_err(|e| AnalyzerError::Scoring(format!("scorer task failed: {}", e)))?;

        Ok(f64::from(analysis.score))
    }
}
