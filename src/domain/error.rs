//! Error types for the gateway.

use thiserror::Error;

/// Failure of a single upstream node call.
///
/// The `Display` text is what the multiplexer embeds after the `ERROR: `
/// marker, so it should read well on its own.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("{code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Invalid { key: String, message: String },

    #[error("Fee schedule error: {0}")]
    FeeSchedule(String),
}

/// Errors surfaced when the node pool cannot produce a usable answer
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("No results from bitcoin multiplexer")]
    NoResults,

    #[error("Upstream error: {0}")]
    Rpc(String),

    #[error("Mixed results")]
    Mixed,
}

/// Transaction policy errors
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Failed to parse transaction: {0}")]
    Parse(String),

    #[error("No previous transaction found: {0}")]
    PreviousTxNotFound(String),

    #[error("Not enough fees")]
    InsufficientFee,
}

/// Request validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Validation failed: {0}")]
    Multiple(String),
}

/// Top-level application error
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl AppError {
    /// Stable numeric code reported to API clients alongside the HTTP status.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Config(ConfigError::Missing(_)) => 11,
            Self::Config(ConfigError::Invalid { .. }) => 12,
            Self::Config(ConfigError::FeeSchedule(_)) => 13,
            Self::Upstream(UpstreamError::NoResults) => 21,
            Self::Upstream(UpstreamError::Rpc(_)) => 22,
            Self::Upstream(UpstreamError::Mixed) => 23,
            Self::Transaction(TransactionError::Parse(_)) => 31,
            Self::Transaction(TransactionError::PreviousTxNotFound(_)) => 32,
            Self::Transaction(TransactionError::InsufficientFee) => 33,
            Self::Validation(_) => 41,
            Self::Serialization(_) => 51,
            Self::RateLimited => 61,
        }
    }
}
