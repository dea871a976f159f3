//! # ASE Common Library
//!
//! Shared code for the ASE sentiment services:
//! - Error types
//! - Service-binding configuration (platform descriptors, TOML bootstrap file)
//! - Message models and the inbound payload decoder

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{AnalyzedNotification, DecodeError, InboundMessage, ResultDocument, TweetRecord};
