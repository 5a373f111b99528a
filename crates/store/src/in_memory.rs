//! In-memory stores — used by tests, the CLI, and ephemeral sessions.

use async_trait::async_trait;
use signalsight_core::analysis::{AnalysisRecord, AnalysisRepository};
use signalsight_core::conversation::{ConversationId, ConversationStore, TranscriptMessage};
use signalsight_core::error::{AnalysisError, ConversationError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Analyses held in a map keyed by ID.
pub struct InMemoryAnalysisRepository {
    records: Arc<RwLock<HashMap<String, AnalysisRecord>>>,
}

impl InMemoryAnalysisRepository {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or replace a record.
    pub async fn insert(&self, record: AnalysisRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Remove a record, returning whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.records.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryAnalysisRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<AnalysisRecord> for InMemoryAnalysisRepository {
    fn from_iter<I: IntoIterator<Item = AnalysisRecord>>(iter: I) -> Self {
        let records = iter.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }
}

#[async_trait]
impl AnalysisRepository for InMemoryAnalysisRepository {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<AnalysisRecord>, AnalysisError> {
        Ok(self.records.read().await.get(id).cloned())
    }
}

/// Transcripts held in a map keyed by conversation ID.
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<ConversationId, Vec<TranscriptMessage>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn transcript(&self, id: &ConversationId) -> Result<Vec<TranscriptMessage>, ConversationError> {
        Ok(self
            .conversations
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, id: &ConversationId, message: TranscriptMessage) -> Result<(), ConversationError> {
        self.conversations
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .push(message);
        Ok(())
    }
}
