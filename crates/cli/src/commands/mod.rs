//! Subcommand implementations and the session wiring they share.

pub mod assemble;
pub mod onboard;
pub mod replay;
pub mod shell;

use signalsight_cache::CacheStats;
use signalsight_config::AppConfig;
use signalsight_context::{AssembledContext, ContextPipeline};
use signalsight_core::enrichment::EnrichmentProvider;
use signalsight_providers::{HttpEnrichmentProvider, StaticEnrichmentProvider};
use signalsight_store::SeedFile;
use std::path::Path;
use std::sync::Arc;

/// Load config and the analyses file, then compose a pipeline.
///
/// Offline sessions serve market data from the file's `snapshots`; online
/// sessions use the HTTP provider from config.
pub fn open_pipeline(
    analyses: &Path,
    offline: bool,
) -> Result<(AppConfig, ContextPipeline), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let seed = SeedFile::load(analyses)?;

    let provider: Arc<dyn EnrichmentProvider> = if offline {
        Arc::new(seed.snapshots.clone().into_iter().collect::<StaticEnrichmentProvider>())
    } else {
        let http = HttpEnrichmentProvider::from_config(&config.enrichment).map_err(|e| {
            format!("{e}. Set [enrichment] base_url in the config or pass --offline")
        })?;
        Arc::new(http)
    };

    let pipeline = ContextPipeline::from_config(&config, Arc::new(seed.repository()), provider);
    Ok((config, pipeline))
}

pub fn print_context(ctx: &AssembledContext) {
    println!("── System ─────────────────────────────────────────────");
    println!("{}", ctx.system);
    println!();
    println!("── Payload ────────────────────────────────────────────");
    println!("{}", ctx.payload);
    println!();
    print_metadata(ctx);
}

pub fn print_metadata(ctx: &AssembledContext) {
    let m = &ctx.metadata;
    println!(
        "  Turn: {} | payload ~{} / {} tokens | total ~{} tokens",
        m.position, m.payload_tokens, m.budget, m.total_tokens
    );
    for section in &ctx.sections {
        let mut flags = Vec::new();
        if section.cached {
            flags.push("cached");
        }
        if section.degraded {
            flags.push("degraded");
        }
        println!(
            "    {:<13} ~{:>5} tokens  {}",
            section.kind.as_str(),
            section.tokens,
            flags.join(", ")
        );
    }
    if m.enrichment_degraded {
        println!("  ⚠️  Market data unavailable for this turn");
    }
    if m.dropped_history_lines > 0 {
        println!("  Dropped {} history line(s) to fit the budget", m.dropped_history_lines);
    }
}

pub fn print_stats(stats: &CacheStats) {
    println!("  Entries:       {}", stats.entries);
    for (kind, count) in &stats.entries_by_kind {
        println!("    {:<13} {}", kind.as_str(), count);
    }
    println!(
        "  Hits/misses:   {}/{} ({:.0}% hit rate)",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0
    );
    println!("  Tokens saved:  {}", stats.tokens_saved);
    println!(
        "  Evicted/expired/invalidated: {}/{}/{}",
        stats.evictions, stats.expirations, stats.invalidations
    );
    match stats.last_cleanup {
        Some(at) => println!("  Last cleanup:  {}", at.to_rfc3339()),
        None => println!("  Last cleanup:  never"),
    }
}
