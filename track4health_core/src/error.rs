//! Error types for the track4health_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for track4health_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP transport error (connection refused, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// User input failed validation; nothing was persisted
    #[error("Validation error: {0}")]
    Validation(String),

    /// An entry with the same name and father/guardian name already exists
    #[error("Duplicate entry: {name} s/o {father_name} is already recorded")]
    Duplicate { name: String, father_name: String },

    /// Referenced record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The environment reports no network connectivity
    #[error("No network connectivity")]
    Offline,

    /// The remote API answered with a failure envelope
    #[error("API error: {0}")]
    Api(String),

    /// The current user's role does not allow the operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
