//! `signalsight assemble` — Assemble the context for one turn.

use signalsight_context::{TurnPosition, TurnRequest};
use signalsight_store::load_transcript;
use std::path::PathBuf;

pub struct AssembleArgs {
    pub analyses: PathBuf,
    pub analysis_id: Option<String>,
    pub message: String,
    pub transcript: Option<PathBuf>,
    pub position: Option<TurnPosition>,
    pub offline: bool,
}

pub async fn run(args: AssembleArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (_config, pipeline) = super::open_pipeline(&args.analyses, args.offline)?;

    let transcript = match &args.transcript {
        Some(path) => load_transcript(path)?,
        None => Vec::new(),
    };

    let request = TurnRequest {
        selected_analysis_id: args.analysis_id,
        transcript,
        user_message: args.message,
        position: args.position,
        auth_token: None,
    };

    match pipeline.assemble(&request).await {
        Ok(ctx) => {
            super::print_context(&ctx);
            Ok(())
        }
        Err(e) => {
            eprintln!("  {}", e.user_message());
            Err(e.into())
        }
    }
}
