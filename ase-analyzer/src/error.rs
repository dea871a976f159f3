//! Error types for ase-analyzer

use thiserror::Error;

/// Errors raised by the analyzer's external collaborators
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Document store failure (connect, ping, insert)
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// Result store refused a write
    #[error("Store error: {0}")]
    Store(String),

    /// Broker failure (connect, subscribe, publish)
    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// Broker refused a published notification
    #[error("Publish rejected: {0}")]
    Publish(String),

    /// Sentiment scorer failed to produce a score
    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// ase-common error
    #[error("Common error: {0}")]
    Common(#[from] ase_common::Error),
}

/// Result type for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;
