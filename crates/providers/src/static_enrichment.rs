//! Static enrichment provider — fixed snapshots per pair.
//!
//! Used for offline CLI runs and tests. Pairs without a snapshot fail
//! like an upstream 404, so the degraded path can be exercised too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signalsight_core::enrichment::EnrichmentProvider;
use signalsight_core::error::EnrichmentError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
pub struct StaticEnrichmentProvider {
    snapshots: HashMap<String, String>,
    calls: AtomicUsize,
}

impl StaticEnrichmentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, pair: impl Into<String>, snapshot: impl Into<String>) -> Self {
        self.snapshots.insert(pair.into(), snapshot.into());
        self
    }

    /// How many snapshots have been requested so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl FromIterator<(String, String)> for StaticEnrichmentProvider {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            snapshots: iter.into_iter().collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EnrichmentProvider for StaticEnrichmentProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn market_snapshot(
        &self,
        pair: &str,
        _as_of: DateTime<Utc>,
        _auth_token: Option<&str>,
    ) -> Result<String, EnrichmentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.snapshots
            .get(pair)
            .cloned()
            .ok_or_else(|| EnrichmentError::Api {
                status_code: 404,
                message: format!("no snapshot for {pair}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_configured_snapshot() {
        let provider = StaticEnrichmentProvider::new().with_snapshot("XAU/USD", "close=2400.5");
        let text = provider
            .market_snapshot("XAU/USD", Utc::now(), None)
            .await
            .unwrap();
        assert_eq!(text, "close=2400.5");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_pair_fails_like_404() {
        let provider = StaticEnrichmentProvider::new();
        let err = provider
            .market_snapshot("EUR/USD", Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EnrichmentError::Api { status_code: 404, .. }));
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn collects_from_pairs() {
        let provider: StaticEnrichmentProvider =
            vec![("EUR/USD".to_string(), "close=1.07".to_string())].into_iter().collect();
        assert_eq!(provider.snapshots.len(), 1);
    }
}
