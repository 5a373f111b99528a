//! Per-turn context assembly.
//!
//! The payload shape depends on the turn position:
//!
//! - **First turn**: analysis → enrichment → conversation so far (usually
//!   empty) → user message. Requires a selected analysis.
//! - **Subsequent turn**: conversation tail → user message. The analysis
//!   and enrichment are not re-sent.
//!
//! The instruction fragment is returned separately as the system text and
//! is never part of the payload.
//!
//! # Ordering
//!
//! Sections are always emitted in the fixed order above. Later sections
//! take precedence when information conflicts, so fresher market data
//! follows the analysis it may contradict.

use serde::{Deserialize, Serialize};
use signalsight_cache::{ContentCache, FragmentKind};
use signalsight_config::ContextConfig;
use signalsight_core::analysis::AnalysisRepository;
use signalsight_core::conversation::{Role, TranscriptMessage};
use signalsight_core::enrichment::EnrichmentProvider;
use signalsight_core::token;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::error::AssemblyError;
use crate::fragments::{
    ENRICHMENT_UNAVAILABLE, AnalysisFragmentBuilder, EnrichmentFragmentBuilder, Fragment,
    InstructionFragment, InstructionFragmentBuilder, render_conversation,
};

/// Header of the block carrying the new user message.
pub const USER_MESSAGE_HEADER: &str = "[User Message]";

// ── Types ─────────────────────────────────────────────────────────────────

/// Whether this exchange opens the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPosition {
    First,
    Subsequent,
}

impl TurnPosition {
    /// First iff the transcript holds no prior user message.
    pub fn infer(transcript: &[TranscriptMessage]) -> Self {
        if transcript.iter().any(|m| m.role == Role::User) {
            Self::Subsequent
        } else {
            Self::First
        }
    }
}

impl std::fmt::Display for TurnPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Subsequent => f.write_str("subsequent"),
        }
    }
}

/// Everything the assembler needs for one turn.
#[derive(Clone, Default)]
pub struct TurnRequest {
    /// Analysis bound to the conversation
    pub selected_analysis_id: Option<String>,
    /// Prior messages, oldest first, excluding the new one
    pub transcript: Vec<TranscriptMessage>,
    pub user_message: String,
    /// Explicit position; `None` infers it from the transcript
    pub position: Option<TurnPosition>,
    /// Forwarded to the enrichment provider
    pub auth_token: Option<String>,
}

impl TurnRequest {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Self::default()
        }
    }

    pub fn with_analysis(mut self, analysis_id: impl Into<String>) -> Self {
        self.selected_analysis_id = Some(analysis_id.into());
        self
    }

    pub fn with_transcript(mut self, transcript: Vec<TranscriptMessage>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_position(mut self, position: TurnPosition) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The explicit position, or the inferred one.
    pub fn resolved_position(&self) -> TurnPosition {
        self.position
            .unwrap_or_else(|| TurnPosition::infer(&self.transcript))
    }
}

impl std::fmt::Debug for TurnRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRequest")
            .field("selected_analysis_id", &self.selected_analysis_id)
            .field("transcript_len", &self.transcript.len())
            .field("user_message", &self.user_message)
            .field("position", &self.position)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// One section of the assembled context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
    pub kind: FragmentKind,
    pub tokens: usize,
    pub cached: bool,
    pub degraded: bool,
}

impl From<&Fragment> for SectionInfo {
    fn from(f: &Fragment) -> Self {
        Self {
            kind: f.kind,
            tokens: f.estimated_tokens,
            cached: f.cached,
            degraded: f.degraded,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssemblyMetadata {
    pub position: TurnPosition,
    /// System text plus payload
    pub total_tokens: usize,
    pub payload_tokens: usize,
    /// Payload budget; the system text is not counted against it
    pub budget: usize,
    pub enrichment_degraded: bool,
    /// Transcript lines dropped to fit the budget
    pub dropped_history_lines: usize,
}

/// The assembled context, ready for the model transport.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    /// Instruction text, sent as the system role
    pub system: String,
    pub payload: String,
    /// In emission order, instruction first
    pub sections: Vec<SectionInfo>,
    pub metadata: AssemblyMetadata,
}

#[derive(Debug, Clone)]
pub struct AssemblerSettings {
    /// Trailing transcript lines considered for the conversation section
    pub history_turns: usize,
    pub max_payload_tokens: usize,
}

impl Default for AssemblerSettings {
    fn default() -> Self {
        Self {
            history_turns: 10,
            max_payload_tokens: 8000,
        }
    }
}

impl From<&ContextConfig> for AssemblerSettings {
    fn from(config: &ContextConfig) -> Self {
        Self {
            history_turns: config.history_turns,
            max_payload_tokens: config.max_payload_tokens,
        }
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

pub struct ContextAssembler {
    analysis: AnalysisFragmentBuilder,
    enrichment: EnrichmentFragmentBuilder,
    instruction: InstructionFragmentBuilder,
    settings: AssemblerSettings,
}

impl ContextAssembler {
    pub fn new(
        cache: Arc<ContentCache>,
        repository: Arc<dyn AnalysisRepository>,
        provider: Arc<dyn EnrichmentProvider>,
        instruction: InstructionFragment,
        settings: AssemblerSettings,
    ) -> Self {
        Self {
            analysis: AnalysisFragmentBuilder::new(repository, Arc::clone(&cache)),
            enrichment: EnrichmentFragmentBuilder::new(provider, Arc::clone(&cache)),
            instruction: InstructionFragmentBuilder::new(instruction, cache),
            settings,
        }
    }

    /// Assemble the context for one turn.
    ///
    /// # Algorithm
    ///
    /// 1. Resolve the turn position (explicit, else inferred)
    /// 2. First turn: require an analysis ID, build the analysis fragment,
    ///    then the enrichment fragment for the analysis' pair and date
    /// 3. Give the conversation tail whatever budget the fixed sections
    ///    and the user message leave, dropping oldest lines first
    /// 4. Join sections with a blank line in fixed order
    pub async fn assemble(&self, request: &TurnRequest) -> Result<AssembledContext, AssemblyError> {
        let position = request.resolved_position();
        let span = info_span!(
            "assemble_turn",
            analysis_id = request.selected_analysis_id.as_deref().unwrap_or("-"),
            position = %position,
        );
        self.assemble_at(request, position).instrument(span).await
    }

    async fn assemble_at(
        &self,
        request: &TurnRequest,
        position: TurnPosition,
    ) -> Result<AssembledContext, AssemblyError> {
        let instruction = self.instruction.build();
        let mut fixed: Vec<Fragment> = Vec::new();

        // ── First turn: analysis + enrichment ─────────────────────────────
        if position == TurnPosition::First {
            let analysis_id = request
                .selected_analysis_id
                .as_deref()
                .ok_or(AssemblyError::NoContextSelected)?;
            let outcome = self.analysis.build(analysis_id).await?;

            let enrichment = match &outcome.record {
                Some(record) => {
                    self.enrichment
                        .build(record, request.auth_token.as_deref())
                        .await
                }
                None => Fragment::placeholder(FragmentKind::Enrichment, ENRICHMENT_UNAVAILABLE),
            };
            fixed.push(outcome.fragment);
            fixed.push(enrichment);
        }

        // ── Conversation tail, within what remains ────────────────────────
        let user_block = format!("{USER_MESSAGE_HEADER}\n{}", request.user_message);
        let user = Fragment::rendered(FragmentKind::Context, user_block);
        // One blank-line separator after each fixed section and after the
        // conversation block.
        let separators = (2 * (fixed.len() + 1)).div_ceil(4);
        let reserved: usize = fixed.iter().map(|f| f.estimated_tokens).sum::<usize>()
            + user.estimated_tokens
            + separators;
        let remaining = self.settings.max_payload_tokens.saturating_sub(reserved);
        if remaining == 0 {
            warn!(
                reserved,
                budget = self.settings.max_payload_tokens,
                "Fixed sections fill the payload budget, no room for history"
            );
        }
        let window = render_conversation(
            &request.transcript,
            self.settings.history_turns,
            Some(remaining),
        );
        if window.dropped > 0 {
            debug!(dropped = window.dropped, "Trimmed conversation history to budget");
        }

        // ── Join in fixed order ───────────────────────────────────────────
        let mut ordered = fixed;
        if !window.fragment.is_empty() {
            ordered.push(window.fragment);
        }
        ordered.push(user);

        let enrichment_degraded = ordered
            .iter()
            .any(|f| f.kind == FragmentKind::Enrichment && f.degraded);
        let payload = ordered
            .iter()
            .map(|f| &*f.content)
            .collect::<Vec<_>>()
            .join("\n\n");
        let payload_tokens = token::estimate_tokens(&payload);

        let mut sections = vec![SectionInfo::from(&instruction)];
        sections.extend(ordered.iter().map(SectionInfo::from));

        let metadata = AssemblyMetadata {
            position,
            total_tokens: instruction.estimated_tokens + payload_tokens,
            payload_tokens,
            budget: self.settings.max_payload_tokens,
            enrichment_degraded,
            dropped_history_lines: window.dropped,
        };
        info!(
            payload_tokens,
            sections = sections.len(),
            enrichment_degraded,
            "Context assembled"
        );

        Ok(AssembledContext {
            system: instruction.content.to_string(),
            payload,
            sections,
            metadata,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::{ANALYSIS_UNAVAILABLE, CONVERSATION_HEADER, DEFAULT_INSTRUCTION};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use signalsight_core::analysis::{AnalysisRecord, Signal};
    use signalsight_core::error::{AnalysisError, EnrichmentError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ── Helpers ────────────────────────────────────────────────────────

    struct Repo {
        records: HashMap<String, AnalysisRecord>,
        fail: bool,
    }

    #[async_trait]
    impl AnalysisRepository for Repo {
        fn name(&self) -> &str {
            "test"
        }
        async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, AnalysisError> {
            if self.fail {
                return Err(AnalysisError::Repository("db down".into()));
            }
            Ok(self.records.get(id).cloned())
        }
    }

    struct Market {
        snapshot: Option<String>,
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl EnrichmentProvider for Market {
        fn name(&self) -> &str {
            "test"
        }
        async fn market_snapshot(
            &self,
            pair: &str,
            _as_of: DateTime<Utc>,
            auth_token: Option<&str>,
        ) -> Result<String, EnrichmentError> {
            self.requests
                .lock()
                .unwrap()
                .push((pair.to_string(), auth_token.map(str::to_string)));
            self.snapshot
                .clone()
                .ok_or_else(|| EnrichmentError::Network("connection refused".into()))
        }
    }

    fn gold() -> AnalysisRecord {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap();
        AnalysisRecord::new("A1", "XAU/USD", at).with_signal(Signal::Buy, Some(80))
    }

    fn market(snapshot: Option<&str>) -> Arc<Market> {
        Arc::new(Market {
            snapshot: snapshot.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn assembler_with(repo: Repo, market: Arc<Market>, settings: AssemblerSettings) -> ContextAssembler {
        ContextAssembler::new(
            Arc::new(ContentCache::with_defaults()),
            Arc::new(repo),
            market,
            InstructionFragment::default(),
            settings,
        )
    }

    fn assembler(market: Arc<Market>) -> ContextAssembler {
        let repo = Repo {
            records: HashMap::from([("A1".to_string(), gold())]),
            fail: false,
        };
        assembler_with(repo, market, AssemblerSettings::default())
    }

    fn after_one_exchange() -> Vec<TranscriptMessage> {
        vec![
            TranscriptMessage::user("what's the entry?"),
            TranscriptMessage::assistant("Around 2395 on a pullback."),
        ]
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn position_inferred_from_prior_user_message() {
        assert_eq!(TurnPosition::infer(&[]), TurnPosition::First);
        assert_eq!(
            TurnPosition::infer(&[TranscriptMessage::assistant("Hi, ask me about A1.")]),
            TurnPosition::First
        );
        assert_eq!(
            TurnPosition::infer(&after_one_exchange()),
            TurnPosition::Subsequent
        );
    }

    #[test]
    fn explicit_position_wins() {
        let request = TurnRequest::new("again")
            .with_transcript(after_one_exchange())
            .with_position(TurnPosition::First);
        assert_eq!(request.resolved_position(), TurnPosition::First);
    }

    #[test]
    fn debug_redacts_auth_token() {
        let request = TurnRequest::new("hi").with_auth_token("secret-token");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[redacted]"));
    }

    #[tokio::test]
    async fn first_turn_orders_analysis_enrichment_message() {
        let assembler = assembler(market(Some("close=2400.5")));
        let ctx = assembler
            .assemble(&TurnRequest::new("what's the entry?").with_analysis("A1"))
            .await
            .unwrap();

        let analysis_at = ctx.payload.find("Pair: XAU/USD").unwrap();
        let signal_at = ctx.payload.find("BUY").unwrap();
        let enrichment_at = ctx.payload.find("close=2400.5").unwrap();
        let message_at = ctx.payload.find("what's the entry?").unwrap();
        assert!(analysis_at < enrichment_at);
        assert!(signal_at < enrichment_at);
        assert!(enrichment_at < message_at);
        assert!(!ctx.payload.contains(CONVERSATION_HEADER));

        assert_eq!(ctx.system, DEFAULT_INSTRUCTION);
        assert!(!ctx.payload.contains(DEFAULT_INSTRUCTION));

        let kinds: Vec<FragmentKind> = ctx.sections.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FragmentKind::Instruction,
                FragmentKind::Analysis,
                FragmentKind::Enrichment,
                FragmentKind::Context,
            ]
        );
        assert_eq!(ctx.metadata.position, TurnPosition::First);
        assert!(!ctx.metadata.enrichment_degraded);
    }

    #[tokio::test]
    async fn subsequent_turn_sends_only_transcript_and_message() {
        let market = market(Some("close=2400.5"));
        let assembler = assembler(Arc::clone(&market));
        let ctx = assembler
            .assemble(
                &TurnRequest::new("and the stop?")
                    .with_analysis("A1")
                    .with_transcript(after_one_exchange()),
            )
            .await
            .unwrap();

        assert!(ctx.payload.starts_with(CONVERSATION_HEADER));
        assert!(ctx.payload.contains("user: what's the entry?"));
        assert!(ctx.payload.ends_with("[User Message]\nand the stop?"));
        assert!(!ctx.payload.contains("Pair: XAU/USD"));
        assert!(!ctx.payload.contains("close=2400.5"));
        assert!(market.requests.lock().unwrap().is_empty());
        assert_eq!(ctx.metadata.position, TurnPosition::Subsequent);
    }

    #[tokio::test]
    async fn subsequent_turn_needs_no_selected_analysis() {
        let assembler = assembler(market(None));
        let ctx = assembler
            .assemble(&TurnRequest::new("thanks").with_transcript(after_one_exchange()))
            .await
            .unwrap();
        assert_eq!(ctx.metadata.position, TurnPosition::Subsequent);
    }

    #[tokio::test]
    async fn first_turn_without_analysis_is_rejected() {
        let assembler = assembler(market(Some("close=1")));
        let err = assembler
            .assemble(&TurnRequest::new("hello"))
            .await
            .unwrap_err();
        assert_eq!(err, AssemblyError::NoContextSelected);
    }

    #[tokio::test]
    async fn unknown_analysis_is_fatal() {
        let assembler = assembler(market(Some("close=1")));
        let err = assembler
            .assemble(&TurnRequest::new("hello").with_analysis("A404"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AssemblyError::AnalysisNotFound {
                analysis_id: "A404".into()
            }
        );
    }

    #[tokio::test]
    async fn failing_enrichment_degrades_turn() {
        let assembler = assembler(market(None));
        let ctx = assembler
            .assemble(&TurnRequest::new("what's the entry?").with_analysis("A1"))
            .await
            .unwrap();

        assert!(ctx.payload.contains("Pair: XAU/USD"));
        assert!(ctx.payload.contains(ENRICHMENT_UNAVAILABLE));
        assert!(ctx.metadata.enrichment_degraded);
        assert!(ctx.sections.iter().any(|s| s.kind == FragmentKind::Enrichment && s.degraded));
    }

    #[tokio::test]
    async fn repository_failure_degrades_both_fixed_sections() {
        let repo = Repo {
            records: HashMap::new(),
            fail: true,
        };
        let market = market(Some("close=2400.5"));
        let assembler = assembler_with(repo, Arc::clone(&market), AssemblerSettings::default());
        let ctx = assembler
            .assemble(&TurnRequest::new("hi").with_analysis("A1"))
            .await
            .unwrap();

        assert!(ctx.payload.starts_with(ANALYSIS_UNAVAILABLE));
        assert!(ctx.payload.contains(ENRICHMENT_UNAVAILABLE));
        assert!(market.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn auth_token_forwarded_to_provider() {
        let market = market(Some("close=2400.5"));
        let assembler = assembler(Arc::clone(&market));
        assembler
            .assemble(
                &TurnRequest::new("hi")
                    .with_analysis("A1")
                    .with_auth_token("tok-1"),
            )
            .await
            .unwrap();
        let requests = market.requests.lock().unwrap();
        assert_eq!(requests.as_slice(), &[("XAU/USD".to_string(), Some("tok-1".to_string()))]);
    }

    #[tokio::test]
    async fn second_first_turn_reuses_cached_fragments() {
        let market = market(Some("close=2400.5"));
        let assembler = assembler(Arc::clone(&market));
        let request = TurnRequest::new("what's the entry?").with_analysis("A1");

        let first = assembler.assemble(&request).await.unwrap();
        let second = assembler.assemble(&request).await.unwrap();

        assert_eq!(first.payload, second.payload);
        assert!(second.sections.iter().take(3).all(|s| s.cached));
        assert_eq!(market.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_trimmed_to_payload_budget() {
        let repo = Repo {
            records: HashMap::new(),
            fail: false,
        };
        let settings = AssemblerSettings {
            history_turns: 50,
            max_payload_tokens: 40,
        };
        let assembler = assembler_with(repo, market(None), settings);

        let transcript: Vec<TranscriptMessage> = (0..20)
            .map(|i| TranscriptMessage::user(format!("message number {i}")))
            .collect();
        let ctx = assembler
            .assemble(&TurnRequest::new("latest").with_transcript(transcript))
            .await
            .unwrap();

        assert!(ctx.metadata.dropped_history_lines > 0);
        assert!(ctx.metadata.payload_tokens <= 40);
        assert!(ctx.payload.contains("message number 19"));
        assert!(!ctx.payload.contains("message number 0\n"));
        assert!(ctx.payload.ends_with("latest"));
    }

    #[tokio::test]
    async fn assembly_is_deterministic() {
        let a = assembler(market(Some("close=2400.5")));
        let b = assembler(market(Some("close=2400.5")));
        let request = TurnRequest::new("what's the entry?").with_analysis("A1");
        let x = a.assemble(&request).await.unwrap();
        let y = b.assemble(&request).await.unwrap();
        assert_eq!(x.payload, y.payload);
        assert_eq!(x.system, y.system);
    }
}
