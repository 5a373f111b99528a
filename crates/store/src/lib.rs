//! Analysis and conversation stores for SignalSight.

pub mod file_backend;
pub mod in_memory;

pub use file_backend::{SeedFile, load_transcript};
pub use in_memory::{InMemoryAnalysisRepository, InMemoryConversationStore};
