//! Error types for firelens-core

use thiserror::Error;

/// Main error type for the firelens-core library
///
/// Cancellation is not an error: a superseded refresh or a stopped
/// chat turn is reported through outcome enums, never as an error.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport failure or non-success HTTP status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Response body decoded but did not have the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Reverse geocoding failed
    #[error("geocoding error: {0}")]
    Geocoding(String),

    /// Invalid viewport bounds
    #[error("invalid viewport: {0}")]
    InvalidViewport(String),

    /// Conversation not found
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}

/// Result type alias for firelens-core
pub type Result<T> = std::result::Result<T, Error>;
