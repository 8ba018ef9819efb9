//! Error type shared by all NewsBrief crates.

use thiserror::Error;

/// Errors raised by NewsBrief components.
#[derive(Debug, Error)]
pub enum BriefError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("API key missing for provider: {0}")]
    ApiKeyMissing(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    Cron { expression: String, reason: String },

    #[error("Timed out after {0}s: {1}")]
    Timeout(u64, String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BriefError>;

impl BriefError {
    /// Shorthand used by the cron evaluator.
    pub fn cron(expression: &str, reason: impl std::fmt::Display) -> Self {
        Self::Cron {
            expression: expression.to_string(),
            reason: reason.to_string(),
        }
    }
}
