//! Conditions that stop a turn from being assembled.

use thiserror::Error;

/// Fatal to the turn and reported to the caller. Never retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// A first turn was requested with no analysis bound to the conversation.
    #[error("No analysis selected for this conversation")]
    NoContextSelected,

    /// The bound analysis no longer resolves.
    #[error("Analysis not found: {analysis_id}")]
    AnalysisNotFound { analysis_id: String },
}

impl AssemblyError {
    /// Actionable text for the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoContextSelected => "select an analysis first",
            Self::AnalysisNotFound { .. } => "the selected analysis is no longer available",
        }
    }
}
