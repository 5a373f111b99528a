//! Fragment builders — one per fragment kind.
//!
//! Each builder renders a unit of prompt text from a domain input. The
//! cached builders (analysis, enrichment, instruction) consult and
//! populate the shared [`ContentCache`](signalsight_cache::ContentCache);
//! the conversation builder never touches it.

pub mod analysis;
pub mod conversation;
pub mod enrichment;
pub mod instruction;

use serde::Serialize;
use signalsight_cache::{CachedFragment, FragmentKind};
use signalsight_core::token;
use std::sync::Arc;

pub use analysis::{ANALYSIS_UNAVAILABLE, AnalysisFragmentBuilder, AnalysisOutcome, render_analysis};
pub use conversation::{CONVERSATION_HEADER, ConversationWindow, render_conversation};
pub use enrichment::{ENRICHMENT_UNAVAILABLE, EnrichmentFragmentBuilder, enrichment_params, render_snapshot};
pub use instruction::{DEFAULT_INSTRUCTION, InstructionFragment, InstructionFragmentBuilder};

/// A rendered unit of prompt text.
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub kind: FragmentKind,
    #[serde(serialize_with = "serialize_content")]
    pub content: Arc<str>,
    pub estimated_tokens: usize,
    /// Served from the cache rather than freshly rendered
    pub cached: bool,
    /// A placeholder standing in for content that could not be produced
    pub degraded: bool,
}

impl Fragment {
    /// Freshly rendered content.
    pub fn rendered(kind: FragmentKind, content: impl Into<Arc<str>>) -> Self {
        let content = content.into();
        Self {
            kind,
            estimated_tokens: token::estimate_tokens(&content),
            content,
            cached: false,
            degraded: false,
        }
    }

    /// Placeholder text substituted after a failure.
    pub fn placeholder(kind: FragmentKind, text: &str) -> Self {
        Self {
            degraded: true,
            ..Self::rendered(kind, text)
        }
    }

    pub(crate) fn from_cache(kind: FragmentKind, hit: CachedFragment) -> Self {
        Self {
            kind,
            content: hit.content,
            estimated_tokens: hit.estimated_tokens,
            cached: true,
            degraded: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

fn serialize_content<S: serde::Serializer>(content: &Arc<str>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_fragment_counts_tokens() {
        let fragment = Fragment::rendered(FragmentKind::Analysis, "12345678");
        assert_eq!(fragment.estimated_tokens, 2);
        assert!(!fragment.cached);
        assert!(!fragment.degraded);
    }

    #[test]
    fn placeholder_is_degraded() {
        let fragment = Fragment::placeholder(FragmentKind::Enrichment, ENRICHMENT_UNAVAILABLE);
        assert!(fragment.degraded);
        assert_eq!(&*fragment.content, ENRICHMENT_UNAVAILABLE);
    }
}
