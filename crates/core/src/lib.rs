//! # SignalSight Core
//!
//! Domain types, collaborator traits, and error definitions for the
//! SignalSight assistant context pipeline. This crate has **no runtime
//! dependencies** beyond serde/chrono. It defines the domain model that
//! the cache, store, provider, and context crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator of the pipeline is a trait here:
//! - [`AnalysisRepository`] — read-only access to computed analyses
//! - [`EnrichmentProvider`] — fallible market-data snapshots
//! - [`ConversationStore`] — ordered chat transcripts
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted doubles without touching the pipeline.

pub mod analysis;
pub mod conversation;
pub mod enrichment;
pub mod error;
pub mod token;

// Re-export key types at crate root for ergonomics
pub use analysis::{AnalysisRecord, AnalysisRepository, AnalysisStatus, Signal};
pub use conversation::{ConversationId, ConversationStore, Role, TranscriptMessage};
pub use enrichment::EnrichmentProvider;
pub use error::{AnalysisError, ConversationError, EnrichmentError, Error, Result};
