//! The composed pipeline: an assembler over one injected cache, plus
//! operator controls for that cache.

use signalsight_cache::{CacheSettings, CacheStats, ContentCache, EntrySummary, FragmentKind, FragmentParams};
use signalsight_config::AppConfig;
use signalsight_core::analysis::AnalysisRepository;
use signalsight_core::enrichment::EnrichmentProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::assembler::{AssembledContext, AssemblerSettings, ContextAssembler, TurnRequest};
use crate::error::AssemblyError;
use crate::fragments::InstructionFragment;

pub struct ContextPipeline {
    cache: Arc<ContentCache>,
    assembler: ContextAssembler,
}

impl ContextPipeline {
    pub fn new(
        cache: Arc<ContentCache>,
        repository: Arc<dyn AnalysisRepository>,
        provider: Arc<dyn EnrichmentProvider>,
        instruction: InstructionFragment,
        settings: AssemblerSettings,
    ) -> Self {
        let assembler =
            ContextAssembler::new(Arc::clone(&cache), repository, provider, instruction, settings);
        Self { cache, assembler }
    }

    /// Build a pipeline with a fresh cache sized from `config`.
    pub fn from_config(
        config: &AppConfig,
        repository: Arc<dyn AnalysisRepository>,
        provider: Arc<dyn EnrichmentProvider>,
    ) -> Self {
        let cache = Arc::new(ContentCache::new(CacheSettings {
            max_entries: config.cache.max_entries,
            max_age: config.cache.max_age(),
        }));
        info!(
            max_entries = config.cache.max_entries,
            max_age_secs = config.cache.max_age_secs,
            provider = provider.name(),
            repository = repository.name(),
            "Context pipeline ready"
        );
        Self::new(
            cache,
            repository,
            provider,
            InstructionFragment::from_config(&config.context),
            AssemblerSettings::from(&config.context),
        )
    }

    pub async fn assemble(&self, request: &TurnRequest) -> Result<AssembledContext, AssemblyError> {
        self.assembler.assemble(request).await
    }

    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    // ── Operator controls ─────────────────────────────────────────────────

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn entries(&self, kind: Option<FragmentKind>) -> Vec<EntrySummary> {
        self.cache.entries(kind)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn invalidate(&self, kind: FragmentKind, prefix: &FragmentParams) -> usize {
        self.cache.invalidate(kind, prefix)
    }

    /// Drop cached snapshots for `pair`, or only the one for `pair` on `date`.
    pub fn refresh_enrichment(&self, pair: &str, date: Option<&str>) -> usize {
        let mut prefix = FragmentParams::new().with("pair", pair);
        if let Some(date) = date {
            prefix = prefix.with("date", date);
        }
        self.cache.invalidate(FragmentKind::Enrichment, &prefix)
    }

    /// Start the periodic TTL sweep for this pipeline's cache.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        ContentCache::spawn_sweeper(&self.cache, period)
    }
}
