//! Enrichment provider trait — fresh market data merged into first-turn context.
//!
//! A provider turns `(pair, as_of)` into a plain-text market snapshot.
//! It is the only fallible network collaborator of the pipeline; callers
//! are expected to degrade (not abort) when it fails.
//!
//! Implementations: HTTP OHLC endpoint, static snapshots (offline/testing).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EnrichmentError;

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// The provider name (e.g., "http", "static").
    fn name(&self) -> &str;

    /// Fetch a textual market snapshot for `pair` as of `as_of`.
    ///
    /// The provider enforces its own timeout; the caller awaits without one.
    async fn market_snapshot(
        &self,
        pair: &str,
        as_of: DateTime<Utc>,
        auth_token: Option<&str>,
    ) -> std::result::Result<String, EnrichmentError>;
}
