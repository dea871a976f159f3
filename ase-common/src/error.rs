//! Common error types for ASE

use thiserror::Error;

/// Common result type for ASE operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across ASE services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform descriptor or payload was not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required service binding is absent from the platform descriptor
    #[error("Missing service binding: {0} (check that the app is bound to the service)")]
    MissingBinding(String),
}
