//! `signalsight replay` — Replay a recorded conversation turn by turn.
//!
//! Each user message is assembled against the transcript that preceded
//! it, through a single pipeline, so cache reuse across turns is visible.

use signalsight_context::TurnRequest;
use signalsight_core::conversation::{Role, TranscriptMessage};
use signalsight_store::load_transcript;
use std::path::Path;

/// The turns to replay: each user message with everything before it.
pub fn user_turns(transcript: &[TranscriptMessage]) -> Vec<(usize, &TranscriptMessage)> {
    transcript
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::User)
        .collect()
}

pub async fn run(
    analyses: &Path,
    analysis_id: &str,
    transcript: &Path,
    offline: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, pipeline) = super::open_pipeline(analyses, offline)?;
    let transcript = load_transcript(transcript)?;
    let turns = user_turns(&transcript);

    if turns.is_empty() {
        println!("  No user messages to replay.");
        return Ok(());
    }

    for (n, (index, message)) in turns.iter().enumerate() {
        let request = TurnRequest::new(message.content.clone())
            .with_analysis(analysis_id)
            .with_transcript(transcript[..*index].to_vec());

        println!("── Turn {} ─ {}", n + 1, message.content);
        match pipeline.assemble(&request).await {
            Ok(ctx) => super::print_metadata(&ctx),
            Err(e) => {
                eprintln!("  {}", e.user_message());
                return Err(e.into());
            }
        }
        println!();
    }

    println!("── Cache ──────────────────────────────────────────────");
    super::print_stats(&pipeline.stats());
    Ok(())
}
