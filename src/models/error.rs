//! Error types for cpseval.
//!
//! Taxonomy:
//! - Configuration problems fail fast at startup
//! - Backend failures either resolve inside the retry budget or abort the run
//! - Load-boundary I/O is handled by the store (degrades to empty), so `Io`
//!   here only surfaces from writes

use thiserror::Error;

/// Top-level error type for cpseval.
#[derive(Debug, Error)]
pub enum CpsEvalError {
    // ═══════════════════════════════════════════════════════════════════
    // Expected failures
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Parse error: {0}")]
    Parse(String),

    // ═══════════════════════════════════════════════════════════════════
    // Backend / infrastructure
    // ═══════════════════════════════════════════════════════════════════
    #[error("Backend API error: {0}")]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Invariant violations
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by a judge/generator backend.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed for endpoint '{0}'")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Resource exhausted after {attempts} attempts on '{model}'")]
    RetriesExhausted { model: String, attempts: u32 },
}

impl CpsEvalError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type alias for cpseval.
pub type Result<T> = std::result::Result<T, CpsEvalError>;
