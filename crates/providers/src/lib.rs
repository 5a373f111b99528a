//! Market-data enrichment providers for SignalSight.

pub mod http_enrichment;
pub mod static_enrichment;

pub use http_enrichment::{HttpEnrichmentProvider, OhlcBar, render_bars};
pub use static_enrichment::StaticEnrichmentProvider;
