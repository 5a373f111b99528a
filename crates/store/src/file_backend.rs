//! JSON seed files — load analyses, offline snapshots, and transcripts
//! from disk into the in-memory stores.
//!
//! Analyses file:
//!
//! ```json
//! {
//!   "analyses": [ { "id": "A1", "pair": "XAU/USD", "created_at": "...", "signal": "BUY" } ],
//!   "snapshots": { "XAU/USD": "close=2400.5" }
//! }
//! ```
//!
//! Transcript file: a JSON array of `{ "role": "user", "content": "..." }`.

use serde::Deserialize;
use signalsight_core::analysis::AnalysisRecord;
use signalsight_core::conversation::TranscriptMessage;
use signalsight_core::error::{AnalysisError, ConversationError};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::in_memory::InMemoryAnalysisRepository;

/// Parsed analyses seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    pub analyses: Vec<AnalysisRecord>,

    /// Offline market snapshots by pair
    #[serde(default)]
    pub snapshots: BTreeMap<String, String>,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::Repository(format!("Failed to read {}: {e}", path.display()))
        })?;
        let seed: Self = serde_json::from_str(&content).map_err(|e| {
            AnalysisError::InvalidRecord(format!("{}: {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            analyses = seed.analyses.len(),
            snapshots = seed.snapshots.len(),
            "Loaded seed file"
        );
        Ok(seed)
    }

    /// Build a repository holding every analysis in the file.
    pub fn repository(&self) -> InMemoryAnalysisRepository {
        self.analyses.iter().cloned().collect()
    }
}

/// Read a transcript file.
pub fn load_transcript(path: &Path) -> Result<Vec<TranscriptMessage>, ConversationError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConversationError::Storage(format!("Failed to read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&content)
        .map_err(|e| ConversationError::Storage(format!("Invalid transcript {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use signalsight_core::analysis::{AnalysisRepository, Signal};
    use signalsight_core::conversation::Role;

    const SEED: &str = r#"{
        "analyses": [
            {"id": "A1", "pair": "XAU/USD", "created_at": "2026-10-19T08:30:00Z", "signal": "BUY", "confidence": 80}
        ],
        "snapshots": {"XAU/USD": "close=2400.5"}
    }"#;

    #[tokio::test]
    async fn seed_file_builds_repository() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.json");
        std::fs::write(&path, SEED).unwrap();

        let seed = SeedFile::load(&path).unwrap();
        assert_eq!(seed.snapshots.get("XAU/USD").map(String::as_str), Some("close=2400.5"));

        let repo = seed.repository();
        let record = repo.get_analysis("A1").await.unwrap().unwrap();
        assert_eq!(record.signal, Some(Signal::Buy));
    }

    #[test]
    fn snapshots_are_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.json");
        std::fs::write(&path, r#"{"analyses": []}"#).unwrap();
        let seed = SeedFile::load(&path).unwrap();
        assert!(seed.snapshots.is_empty());
    }

    #[test]
    fn invalid_seed_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analyses.json");
        std::fs::write(&path, r#"{"analyses": [{"id": 5}]}"#).unwrap();
        assert!(matches!(
            SeedFile::load(&path),
            Err(AnalysisError::InvalidRecord(_))
        ));
    }

    #[test]
    fn missing_seed_is_repository_error() {
        assert!(matches!(
            SeedFile::load(Path::new("/nonexistent/analyses.json")),
            Err(AnalysisError::Repository(_))
        ));
    }

    #[test]
    fn transcript_file_loads_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.json");
        std::fs::write(
            &path,
            r#"[{"role":"user","content":"what's the entry?"},{"role":"assistant","content":"Near 2395."}]"#,
        )
        .unwrap();

        let transcript = load_transcript(&path).unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].role, Role::User);
        assert_eq!(transcript[1].content, "Near 2395.");
    }
}
