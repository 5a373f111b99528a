//! Analysis fragment — the selected analysis rendered as text.
//!
//! Rendering is byte-deterministic: the same record always produces the
//! same text, which is what makes the content hash a reliable dedup key.
//! The typed header lines come first, followed by a JSON dump of the whole
//! record so fields the type does not model still reach the model.

use chrono::SecondsFormat;
use signalsight_cache::{ContentCache, FragmentKind, FragmentParams};
use signalsight_core::analysis::{AnalysisRecord, AnalysisRepository};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, warn};

use super::Fragment;
use crate::error::AssemblyError;

/// Substituted when the repository fails for a reason other than a
/// missing record.
pub const ANALYSIS_UNAVAILABLE: &str =
    "[Analysis Unavailable]\nThe selected analysis could not be loaded for this turn.";

/// Render a record as the analysis block.
pub fn render_analysis(record: &AnalysisRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Analysis {}]", record.id);
    let _ = writeln!(out, "Pair: {}", record.pair);
    let _ = writeln!(
        out,
        "Created: {}",
        record.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let _ = writeln!(out, "Status: {}", record.status);
    if let Some(tf) = &record.timeframe {
        let _ = writeln!(out, "Timeframe: {tf}");
    }

    if let Some(signal) = record.signal {
        match record.confidence {
            Some(c) => {
                let _ = writeln!(out, "Signal: {signal} (confidence {c}%)");
            }
            None => {
                let _ = writeln!(out, "Signal: {signal}");
            }
        }
        let levels: Vec<String> = [
            ("entry", record.entry_price),
            ("stop", record.stop_loss),
            ("target", record.take_profit),
        ]
        .into_iter()
        .filter_map(|(label, v)| v.map(|v| format!("{label}={v}")))
        .collect();
        if !levels.is_empty() {
            let _ = writeln!(out, "Levels: {}", levels.join(", "));
        }
    }

    if let Some(summary) = &record.summary {
        let _ = writeln!(out, "Summary: {summary}");
    }

    // serde_json::Value maps are ordered, so the dump is stable
    match serde_json::to_value(record).and_then(|v| serde_json::to_string_pretty(&v)) {
        Ok(dump) => {
            let _ = write!(out, "Record:\n{dump}");
        }
        Err(e) => {
            warn!(analysis_id = %record.id, error = %e, "Failed to dump analysis record");
        }
    }

    out.trim_end().to_string()
}

/// Result of building the analysis fragment. The record is carried along
/// so the enrichment step knows which pair and date to fetch.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub fragment: Fragment,
    pub record: Option<AnalysisRecord>,
}

pub struct AnalysisFragmentBuilder {
    repository: Arc<dyn AnalysisRepository>,
    cache: Arc<ContentCache>,
}

impl AnalysisFragmentBuilder {
    pub fn new(repository: Arc<dyn AnalysisRepository>, cache: Arc<ContentCache>) -> Self {
        Self { repository, cache }
    }

    /// Load and render the analysis.
    ///
    /// A missing record is fatal to the turn. Any other repository failure
    /// degrades to [`ANALYSIS_UNAVAILABLE`].
    pub async fn build(&self, analysis_id: &str) -> Result<AnalysisOutcome, AssemblyError> {
        let record = match self.repository.get_analysis(analysis_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                return Err(AssemblyError::AnalysisNotFound {
                    analysis_id: analysis_id.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    analysis_id,
                    repository = self.repository.name(),
                    error = %e,
                    "Analysis lookup failed, substituting placeholder"
                );
                return Ok(AnalysisOutcome {
                    fragment: Fragment::placeholder(FragmentKind::Analysis, ANALYSIS_UNAVAILABLE),
                    record: None,
                });
            }
        };

        let params = FragmentParams::new().with("id", &record.id);
        let content = render_analysis(&record);
        let key = ContentCache::key_for(FragmentKind::Analysis, &params, &content);

        let fragment = match self.cache.get_by_exact_key(&key) {
            Some(hit) => Fragment::from_cache(FragmentKind::Analysis, hit),
            None => {
                self.cache.put(FragmentKind::Analysis, &params, &content);
                debug!(analysis_id, "Analysis fragment stored");
                Fragment::rendered(FragmentKind::Analysis, content)
            }
        };

        Ok(AnalysisOutcome {
            fragment,
            record: Some(record),
        })
    }
}
