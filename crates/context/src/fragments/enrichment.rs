//! Enrichment fragment — a market-data snapshot for the analysis' pair.
//!
//! This is the only builder that makes a fallible external call. Failures
//! never propagate: the turn proceeds with [`ENRICHMENT_UNAVAILABLE`],
//! which is not cached, so the next first turn for the same pair retries.
//!
//! The fetch-and-store step runs on its own task. If the caller abandons
//! the turn mid-fetch, the snapshot still lands in the cache for reuse.

use chrono::{DateTime, Utc};
use signalsight_cache::{ContentCache, FragmentKind, FragmentParams};
use signalsight_core::analysis::AnalysisRecord;
use signalsight_core::enrichment::EnrichmentProvider;
use signalsight_core::error::EnrichmentError;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Fragment;

pub const ENRICHMENT_UNAVAILABLE: &str =
    "[Market Data]\nEnrichment unavailable: live market data could not be retrieved for this turn.";

/// Cache parameters for a snapshot: `pair`, then `date`.
pub fn enrichment_params(pair: &str, date: &str) -> FragmentParams {
    FragmentParams::new().with("pair", pair).with("date", date)
}

pub fn render_snapshot(pair: &str, date: &str, snapshot: &str) -> String {
    format!("[Market Data {pair} as of {date}]\n{}", snapshot.trim_end())
}

pub struct EnrichmentFragmentBuilder {
    provider: Arc<dyn EnrichmentProvider>,
    cache: Arc<ContentCache>,
}

impl EnrichmentFragmentBuilder {
    pub fn new(provider: Arc<dyn EnrichmentProvider>, cache: Arc<ContentCache>) -> Self {
        Self { provider, cache }
    }

    /// Snapshot for the record's pair as of its creation date, from the
    /// cache when possible.
    pub async fn build(&self, record: &AnalysisRecord, auth_token: Option<&str>) -> Fragment {
        let pair = record.pair.as_str();
        let date = record.as_of_date();
        let params = enrichment_params(pair, &date);

        if let Some(hit) = self.cache.find_by_parameters(FragmentKind::Enrichment, &params) {
            return Fragment::from_cache(FragmentKind::Enrichment, hit);
        }

        let fetch = tokio::spawn(fetch_and_store(
            Arc::clone(&self.provider),
            Arc::clone(&self.cache),
            pair.to_string(),
            date,
            record.created_at,
            auth_token.map(str::to_string),
        ));

        let result = match fetch.await {
            Ok(result) => result,
            Err(e) => Err(EnrichmentError::Network(format!("enrichment task failed: {e}"))),
        };

        match result {
            Ok(content) => Fragment::rendered(FragmentKind::Enrichment, content),
            Err(e) => {
                warn!(
                    pair,
                    provider = self.provider.name(),
                    error = %e,
                    "Enrichment unavailable, continuing degraded"
                );
                Fragment::placeholder(FragmentKind::Enrichment, ENRICHMENT_UNAVAILABLE)
            }
        }
    }
}

async fn fetch_and_store(
    provider: Arc<dyn EnrichmentProvider>,
    cache: Arc<ContentCache>,
    pair: String,
    date: String,
    as_of: DateTime<Utc>,
    auth_token: Option<String>,
) -> Result<String, EnrichmentError> {
    let snapshot = provider
        .market_snapshot(&pair, as_of, auth_token.as_deref())
        .await?;
    if snapshot.trim().is_empty() {
        return Err(EnrichmentError::InvalidResponse(format!(
            "empty snapshot for {pair}"
        )));
    }

    let content = render_snapshot(&pair, &date, &snapshot);
    cache.put(
        FragmentKind::Enrichment,
        &enrichment_params(&pair, &date),
        &content,
    );
    debug!(pair = %pair, date = %date, "Enrichment snapshot cached");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Scripted {
        reply: Result<String, EnrichmentError>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(text: &str) -> Self {
            Self {
                reply: Ok(text.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(EnrichmentError::Timeout("upstream slow".into())),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EnrichmentProvider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn market_snapshot(
            &self,
            _pair: &str,
            _as_of: DateTime<Utc>,
            _auth_token: Option<&str>,
        ) -> Result<String, EnrichmentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(EnrichmentError::Timeout(e.to_string())),
            }
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    fn record(pair: &str) -> AnalysisRecord {
        AnalysisRecord::new("A1", pair, as_of())
    }

    #[tokio::test]
    async fn snapshot_is_rendered_and_cached() {
        let cache = Arc::new(ContentCache::with_defaults());
        let provider = Arc::new(Scripted::ok("close=2400.5"));
        let builder = EnrichmentFragmentBuilder::new(provider.clone(), Arc::clone(&cache));

        let first = builder.build(&record("XAU/USD"), None).await;
        assert_eq!(&*first.content, "[Market Data XAU/USD as of 2026-10-19]\nclose=2400.5");
        assert!(!first.cached);

        let second = builder.build(&record("XAU/USD"), None).await;
        assert!(second.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn snapshot_date_follows_record_creation_day() {
        let cache = Arc::new(ContentCache::with_defaults());
        let provider = Arc::new(Scripted::ok("close=1.07"));
        let builder = EnrichmentFragmentBuilder::new(provider.clone(), Arc::clone(&cache));

        let later = AnalysisRecord::new("A2", "EUR/USD", as_of() + chrono::Duration::days(1));
        builder.build(&record("EUR/USD"), None).await;
        let next_day = builder.build(&later, None).await;

        assert!(!next_day.cached);
        assert!(next_day.content.starts_with("[Market Data EUR/USD as of 2026-10-20]"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(cache
            .find_by_parameters(FragmentKind::Enrichment, &enrichment_params("EUR/USD", "2026-10-20"))
            .is_some());
    }

    #[tokio::test]
    async fn failure_yields_uncached_placeholder() {
        let cache = Arc::new(ContentCache::with_defaults());
        let provider = Arc::new(Scripted::failing());
        let builder = EnrichmentFragmentBuilder::new(provider.clone(), Arc::clone(&cache));

        let fragment = builder.build(&record("XAU/USD"), None).await;
        assert!(fragment.degraded);
        assert_eq!(&*fragment.content, ENRICHMENT_UNAVAILABLE);
        assert!(cache.is_empty());

        // Not cached, so the next attempt goes upstream again
        builder.build(&record("XAU/USD"), None).await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_snapshot_counts_as_failure() {
        let cache = Arc::new(ContentCache::with_defaults());
        let builder = EnrichmentFragmentBuilder::new(Arc::new(Scripted::ok("  \n")), Arc::clone(&cache));
        let fragment = builder.build(&record("EUR/USD"), None).await;
        assert!(fragment.degraded);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidated_snapshot_is_refetched() {
        let cache = Arc::new(ContentCache::with_defaults());
        let provider = Arc::new(Scripted::ok("close=1.07"));
        let builder = EnrichmentFragmentBuilder::new(provider.clone(), Arc::clone(&cache));

        builder.build(&record("EUR/USD"), None).await;
        let removed = cache.invalidate(
            FragmentKind::Enrichment,
            &FragmentParams::new().with("pair", "EUR/USD"),
        );
        assert_eq!(removed, 1);

        let again = builder.build(&record("EUR/USD"), None).await;
        assert!(!again.cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_fetch_still_populates_cache() {
        let cache = Arc::new(ContentCache::with_defaults());
        let provider = Arc::new(Scripted {
            delay: Duration::from_secs(5),
            ..Scripted::ok("close=2400.5")
        });
        let builder = EnrichmentFragmentBuilder::new(provider, Arc::clone(&cache));

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), builder.build(&record("XAU/USD"), None)).await;
        assert!(abandoned.is_err());
        assert!(cache.is_empty());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let hit = cache.find_by_parameters(
            FragmentKind::Enrichment,
            &enrichment_params("XAU/USD", "2026-10-19"),
        );
        assert!(hit.is_some());
    }
}
