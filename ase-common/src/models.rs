//! Message and document models for the sentiment pipeline
//!
//! Inbound deliveries arrive either as a structured JSON object or as a JSON
//! string whose contents are the encoded object. [`decode_value`] accepts both
//! and yields the same [`InboundMessage`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Why an inbound payload could not be turned into a tweet record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("malformed tweet record: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Envelope delivered on the tweets topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub tweet: TweetRecord,
}

/// Tweet-like record to be scored
///
/// `date` is carried through untouched, whatever JSON shape the producer used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetRecord {
    #[serde(default)]
    pub phrase: String,
    pub text: String,
    #[serde(default)]
    pub date: Value,
}

/// Document appended to the results collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDocument {
    pub phrase: String,
    pub text: String,
    pub date: Value,
    pub sentiment: f64,
}

impl ResultDocument {
    pub fn scored(tweet: &TweetRecord, sentiment: f64) -> Self {
        Self {
            phrase: tweet.phrase.clone(),
            text: tweet.text.clone(),
            date: tweet.date.clone(),
            sentiment,
        }
    }
}

/// Phrase/date pair announced to the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analyzed {
    pub phrase: String,
    pub date: Value,
}

/// Notification published on the analyzed topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedNotification {
    pub analyzed: Analyzed,
    /// Provenance label of the publishing client
    pub frontend: String,
}

impl AnalyzedNotification {
    pub fn new(tweet: &TweetRecord, frontend: impl Into<String>) -> Self {
        Self {
            analyzed: Analyzed {
                phrase: tweet.phrase.clone(),
                date: tweet.date.clone(),
            },
            frontend: frontend.into(),
        }
    }
}

/// Decode a raw delivery body
pub fn decode_payload(bytes: &[u8]) -> Result<InboundMessage, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::InvalidJson)?;
    decode_value(value)
}

/// Decode an already-parsed payload
///
/// A JSON string is parsed once more; any other value is used as-is.
pub fn decode_value(value: Value) -> Result<InboundMessage, DecodeError> {
    let value = match value {
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(DecodeError::InvalidJson)?,
        other => other,
    };

    let tweet = match value.get("tweet") {
        Some(tweet) if !tweet.is_null() => tweet,
        _ => return Err(DecodeError::MissingField("tweet")),
    };

    match tweet.get("text") {
        Some(text) if !text.is_null() => {}
        _ => return Err(DecodeError::MissingField("tweet.text")),
    }

    let tweet: TweetRecord = serde_json::from_value(tweet.clone()).map_err(DecodeError::Malformed)?;
    Ok(InboundMessage { tweet })
}
