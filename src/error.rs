//! Error types for Vellum

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Vellum operations
pub type Result<T> = std::result::Result<T, VellumError>;

/// Main error type for Vellum
#[derive(Error, Debug)]
pub enum VellumError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Extractor failed for {path}: {message}")]
    ExtractorFailure { path: PathBuf, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Chunk embedding loss {failed}/{total} exceeds acceptable {max_loss:.0}%")]
    ChunkLossExceeded {
        failed: usize,
        total: usize,
        max_loss: f64,
    },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Filter syntax error: {0}")]
    Filter(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VellumError {
    /// Check if the error is retryable under the backoff policy
    pub fn is_retryable(&self) -> bool {
        matches!(self, VellumError::RateLimited(_) | VellumError::Http(_))
    }

    /// Classify a provider failure: HTTP 429 and textual rate-limit markers
    /// are retryable, everything else is fatal.
    pub fn from_provider_response(status: u16, body: &str) -> Self {
        if status == 429 || is_rate_limit_message(body) {
            VellumError::RateLimited(format!("provider returned {}: {}", status, body))
        } else {
            VellumError::Embedding(format!("provider returned {}: {}", status, body))
        }
    }
}

/// Textual rate-limit detection shared by all providers
pub fn is_rate_limit_message(message: &str) -> bool {
    message.contains("429")
        || message.contains("Too Many Requests")
        || message.to_lowercase().contains("rate_limit")
}
