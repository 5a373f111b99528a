//! `signalsight shell` — Interactive turns with cache operator commands.
//!
//! Plain lines are user turns: the assembled context is printed and the
//! message is recorded in the session transcript. No model is called;
//! `:reply` records what the assistant would have answered.

use signalsight_cache::{FragmentKind, FragmentParams};
use signalsight_context::TurnRequest;
use signalsight_core::conversation::{ConversationId, ConversationStore, TranscriptMessage};
use signalsight_store::InMemoryConversationStore;
use std::io::Write;
use std::path::Path;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::debug;

const HELP: &str = "\
  :stats                              cache statistics
  :entries [kind]                     list cached fragments
  :clear                              drop every cached fragment
  :invalidate <kind> [name=value ...] drop fragments matching a parameter prefix
  :refresh <pair> [date]              drop cached market data for a pair
  :reply <text>                       record an assistant reply
  :quit                               leave the shell";

#[derive(Debug, PartialEq)]
pub enum OperatorCommand {
    Stats,
    Entries(Option<FragmentKind>),
    Clear,
    Invalidate {
        kind: FragmentKind,
        prefix: FragmentParams,
    },
    Refresh {
        pair: String,
        date: Option<String>,
    },
    Reply(String),
    Help,
    Quit,
}

/// Parse a line starting with `:`.
pub fn parse_command(line: &str) -> Result<OperatorCommand, String> {
    let body = line.trim().trim_start_matches(':');
    let (name, rest) = body.split_once(char::is_whitespace).unwrap_or((body, ""));
    let args: Vec<&str> = rest.split_whitespace().collect();

    match name {
        "stats" => Ok(OperatorCommand::Stats),
        "entries" => match args.first() {
            Some(kind) => Ok(OperatorCommand::Entries(Some(kind.parse()?))),
            None => Ok(OperatorCommand::Entries(None)),
        },
        "clear" => Ok(OperatorCommand::Clear),
        "invalidate" => {
            let (kind, pairs) = args
                .split_first()
                .ok_or("usage: :invalidate <kind> [name=value ...]")?;
            let prefix = pairs
                .iter()
                .map(|p| {
                    p.split_once('=')
                        .ok_or_else(|| format!("expected name=value, got '{p}'"))
                })
                .collect::<Result<FragmentParams, String>>()?;
            Ok(OperatorCommand::Invalidate {
                kind: kind.parse()?,
                prefix,
            })
        }
        "refresh" => match args.as_slice() {
            [pair] => Ok(OperatorCommand::Refresh {
                pair: pair.to_string(),
                date: None,
            }),
            [pair, date] => Ok(OperatorCommand::Refresh {
                pair: pair.to_string(),
                date: Some(date.to_string()),
            }),
            _ => Err("usage: :refresh <pair> [date]".into()),
        },
        "reply" if !rest.trim().is_empty() => Ok(OperatorCommand::Reply(rest.trim().to_string())),
        "reply" => Err("usage: :reply <text>".into()),
        "help" | "h" | "?" => Ok(OperatorCommand::Help),
        "quit" | "q" | "exit" => Ok(OperatorCommand::Quit),
        other => Err(format!("unknown command ':{other}', try :help")),
    }
}

pub async fn run(analyses: &Path, analysis_id: &str, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (config, pipeline) = super::open_pipeline(analyses, offline)?;
    let sweeper = pipeline.spawn_sweeper(config.cache.sweep_interval());

    let store = InMemoryConversationStore::new();
    let conversation = ConversationId::new();

    println!();
    println!("  SignalSight shell — analysis {analysis_id}");
    println!("  Market data: {}", if offline { "offline snapshots" } else { "HTTP" });
    println!("  Type a message, or :help for operator commands.");
    println!();

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        if line.starts_with(':') {
            let command = match parse_command(line) {
                Ok(command) => command,
                Err(e) => {
                    println!("  {e}");
                    continue;
                }
            };
            debug!(?command, "Operator command");
            match command {
                OperatorCommand::Stats => super::print_stats(&pipeline.stats()),
                OperatorCommand::Entries(kind) => {
                    let entries = pipeline.entries(kind);
                    if entries.is_empty() {
                        println!("  (no cached fragments)");
                    }
                    for entry in entries {
                        println!(
                            "  {:<13} ~{:>5} tokens  {:>5}s  {}",
                            entry.kind.as_str(),
                            entry.estimated_tokens,
                            entry.age.as_secs(),
                            entry.key
                        );
                    }
                }
                OperatorCommand::Clear => {
                    pipeline.clear_cache();
                    println!("  Cache cleared");
                }
                OperatorCommand::Invalidate { kind, prefix } => {
                    let removed = pipeline.invalidate(kind, &prefix);
                    println!("  Removed {removed} fragment(s)");
                }
                OperatorCommand::Refresh { pair, date } => {
                    let removed = pipeline.refresh_enrichment(&pair, date.as_deref());
                    println!("  Removed {removed} snapshot(s) for {pair}");
                }
                OperatorCommand::Reply(text) => {
                    store
                        .append(&conversation, TranscriptMessage::assistant(text))
                        .await?;
                }
                OperatorCommand::Help => println!("{HELP}"),
                OperatorCommand::Quit => break,
            }
            continue;
        }

        let request = TurnRequest::new(line)
            .with_analysis(analysis_id)
            .with_transcript(store.transcript(&conversation).await?);

        match pipeline.assemble(&request).await {
            Ok(ctx) => {
                println!();
                super::print_context(&ctx);
                println!();
                store
                    .append(&conversation, TranscriptMessage::user(line))
                    .await?;
            }
            Err(e) => println!("  ⚠️  {}", e.user_message()),
        }
    }

    sweeper.abort();
    println!("  Goodbye!");
    Ok(())
}
