//! Instruction fragment — the fixed, versioned system framing.

use signalsight_cache::{ContentCache, FragmentKind, FragmentParams};
use signalsight_config::ContextConfig;
use std::sync::Arc;

use super::Fragment;

pub const DEFAULT_INSTRUCTION: &str = "You are a trading assistant scoped to exactly one \
previously computed analysis. Answer questions about that analysis using the analysis \
block and the market data supplied with it. When the market data is newer than the \
analysis and they disagree, prefer the market data and say so. If market data is marked \
unavailable, answer from the analysis alone and mention that prices may have moved. Do \
not give generic trading advice unrelated to the selected analysis.";

/// Versioned instruction text. The text never changes at runtime; a new
/// text means a new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionFragment {
    pub version: String,
    pub text: String,
}

impl InstructionFragment {
    pub fn new(version: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            text: text.into(),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        let text = config
            .instruction_override
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTRUCTION.to_string());
        Self::new(config.instruction_version.clone(), text)
    }
}

impl Default for InstructionFragment {
    fn default() -> Self {
        Self::new("v1", DEFAULT_INSTRUCTION)
    }
}

pub struct InstructionFragmentBuilder {
    instruction: InstructionFragment,
    params: FragmentParams,
    cache: Arc<ContentCache>,
}

impl InstructionFragmentBuilder {
    pub fn new(instruction: InstructionFragment, cache: Arc<ContentCache>) -> Self {
        let params = FragmentParams::new().with("version", &instruction.version);
        Self {
            instruction,
            params,
            cache,
        }
    }

    /// Looked up by version so the text is not rehashed on every turn.
    pub fn build(&self) -> Fragment {
        if let Some(hit) = self
            .cache
            .find_by_parameters(FragmentKind::Instruction, &self.params)
        {
            return Fragment::from_cache(FragmentKind::Instruction, hit);
        }
        self.cache
            .put(FragmentKind::Instruction, &self.params, &self.instruction.text);
        Fragment::rendered(FragmentKind::Instruction, self.instruction.text.as_str())
    }
}
