//! Error types for the SignalSight domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error variant.

use thiserror::Error;

/// The top-level error type for SignalSight operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Analysis repository errors ---
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    // --- Enrichment provider errors ---
    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),

    // --- Conversation store errors ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error("Analysis repository failure: {0}")]
    Repository(String),

    #[error("Invalid analysis record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, Clone, Error)]
pub enum EnrichmentError {
    #[error("Market data request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Market data authentication failed: {0}")]
    Unauthorized(String),

    #[error("Market data request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid market data response: {0}")]
    InvalidResponse(String),

    #[error("Enrichment provider not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum ConversationError {
    #[error("Conversation storage failure: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrichment_error_displays_status() {
        let err = Error::Enrichment(EnrichmentError::Api {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn analysis_error_converts() {
        let err: Error = AnalysisError::Repository("connection reset".into()).into();
        assert!(matches!(err, Error::Analysis(AnalysisError::Repository(_))));
        assert!(err.to_string().contains("connection reset"));
    }
}
