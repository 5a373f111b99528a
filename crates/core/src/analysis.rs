//! Analysis records — the previously-computed trading analyses a
//! conversation is scoped to.
//!
//! Records are produced elsewhere (the analysis workflow) and are read-only
//! from the pipeline's perspective. The typed fields cover what the
//! assistant renders explicitly; anything else the workflow attaches lands
//! in [`AnalysisRecord::extra`] and is still carried into the rendered dump.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Lifecycle status of an analysis job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    #[default]
    Completed,
    Failed,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Directional trade signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// A single computed analysis for one instrument pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Unique analysis ID
    pub id: String,

    /// Instrument pair, e.g. `XAU/USD`
    pub pair: String,

    /// When the analysis was computed; also the as-of time for enrichment
    pub created_at: DateTime<Utc>,

    /// Job status
    #[serde(default)]
    pub status: AnalysisStatus,

    /// Chart timeframe the analysis ran on (e.g. `H4`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,

    /// Signal confidence in percent (0–100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,

    /// Free-form narrative produced by the analysis workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Fields the workflow produced that are not modeled above
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AnalysisRecord {
    /// Create a completed record with no signal attached.
    pub fn new(id: impl Into<String>, pair: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            pair: pair.into(),
            created_at,
            status: AnalysisStatus::Completed,
            timeframe: None,
            signal: None,
            confidence: None,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            summary: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach a signal and its confidence.
    pub fn with_signal(mut self, signal: Signal, confidence: Option<u8>) -> Self {
        self.signal = Some(signal);
        self.confidence = confidence.map(|c| c.min(100));
        self
    }

    /// Attach an unmodeled field.
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The as-of date used to key enrichment snapshots (`YYYY-MM-DD`).
    pub fn as_of_date(&self) -> String {
        self.created_at.format("%Y-%m-%d").to_string()
    }
}

/// Read-only access to stored analyses.
///
/// Implementations: in-memory (tests, CLI), JSON file seed, or the
/// product's managed database.
#[async_trait]
pub trait AnalysisRepository: Send + Sync {
    /// The repository name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Fetch one analysis by ID. `Ok(None)` means the ID does not resolve.
    async fn get_analysis(&self, id: &str) -> std::result::Result<Option<AnalysisRecord>, AnalysisError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).unwrap()
    }

    #[test]
    fn signal_uses_uppercase_wire_format() {
        let json = serde_json::to_string(&Signal::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        let parsed: Signal = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(parsed, Signal::Sell);
    }

    #[test]
    fn unmodeled_fields_are_kept_in_extra() {
        let json = r#"{
            "id": "A1",
            "pair": "XAU/USD",
            "created_at": "2026-10-19T08:30:00Z",
            "signal": "BUY",
            "confidence": 80,
            "support_levels": [2380.0, 2365.5]
        }"#;
        let record: AnalysisRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.signal, Some(Signal::Buy));
        assert_eq!(record.confidence, Some(80));
        assert!(record.extra.contains_key("support_levels"));

        let back = serde_json::to_string(&record).unwrap();
        assert!(back.contains("support_levels"));
    }

    #[test]
    fn confidence_is_clamped() {
        let record = AnalysisRecord::new("A1", "EUR/USD", created()).with_signal(Signal::Hold, Some(140));
        assert_eq!(record.confidence, Some(100));
    }

    #[test]
    fn as_of_date_is_calendar_day() {
        let record = AnalysisRecord::new("A1", "EUR/USD", created());
        assert_eq!(record.as_of_date(), "2026-10-19");
    }
}
