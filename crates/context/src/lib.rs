//! Assistant context pipeline for SignalSight.
//!
//! Given a conversation turn, decides which prompt fragments are needed,
//! builds them (consulting the shared fragment cache), and joins them into
//! one bounded payload for the model transport.

pub mod assembler;
pub mod error;
pub mod fragments;
pub mod pipeline;

pub use assembler::{
    AssembledContext, AssemblerSettings, AssemblyMetadata, ContextAssembler, SectionInfo,
    TurnPosition, TurnRequest, USER_MESSAGE_HEADER,
};
pub use error::AssemblyError;
pub use fragments::{
    ANALYSIS_UNAVAILABLE, DEFAULT_INSTRUCTION, ENRICHMENT_UNAVAILABLE, Fragment,
    InstructionFragment,
};
pub use pipeline::ContextPipeline;
