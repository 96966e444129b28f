//! Subcommand handling for the Axon CLI.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Subcommand;
use uuid::Uuid;

use axon_core::{
    Config, LegacyEntry, MessageStore, ModelMessage, SseDialect, StreamOrchestrator,
    TerminalReason, TurnObserver, TurnOptions, TurnOutcome, TurnUpdate, decode_sse, to_legacy,
    to_unified,
};

/// CLI subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Replay a captured SSE response body through the streaming
    /// pipeline
    Replay {
        /// File holding the raw SSE body
        file: PathBuf,

        /// Wire dialect of the capture
        #[arg(long, default_value = "openai-compat")]
        dialect: SseDialect,

        /// Record this prompt as the user message before streaming
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Convert a legacy history JSON document to the unified shape
    Migrate {
        /// File holding the legacy history JSON array
        file: PathBuf,

        /// Also print the document converted back to the legacy shape
        #[arg(long)]
        emit_legacy: bool,
    },
}

/// Dispatch a subcommand.
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Replay {
            file,
            dialect,
            prompt,
        } => replay(file, dialect, prompt).await,
        Commands::Migrate { file, emit_legacy } => migrate(file, emit_legacy),
    }
}

/// Observer that echoes streaming progress to stdout.
struct PrintObserver;

#[async_trait]
impl TurnObserver for PrintObserver {
    async fn on_update(&self, update: TurnUpdate) {
        match update {
            TurnUpdate::TextAppended { text, .. } => {
                print!("{text}");
                std::io::stdout().flush().ok();
            }
            TurnUpdate::ContentRevised { .. } => {}
            TurnUpdate::ToolCallStarted { tool_name, .. } => {
                println!("\n[calling {tool_name}...]");
            }
            TurnUpdate::ToolCallUpdated { .. } => {}
            TurnUpdate::ToolCallCompleted { tool_name, .. } => {
                println!("[{tool_name} call complete]");
            }
        }
    }
}

async fn replay(file: PathBuf, dialect: SseDialect, prompt: Option<String>) -> Result<()> {
    let body = std::fs::read(&file)
        .with_context(|| format!("failed to read capture '{}'", file.display()))?;

    // Hand the capture to the decoder in small pieces, the way a
    // network body would arrive.
    let pieces: Vec<Result<Vec<u8>, std::io::Error>> =
        body.chunks(64).map(|c| Ok(c.to_vec())).collect();
    let transport = decode_sse(futures::stream::iter(pieces), dialect);

    let config = Config::load().unwrap_or_default();
    let options = TurnOptions::from_config(&config);
    let store = Arc::new(MessageStore::new());
    let orchestrator = StreamOrchestrator::new(Arc::clone(&store));

    if let Some(prompt) = prompt {
        orchestrator.push_user_message(prompt, &options);
    }

    let outcome = orchestrator
        .run_turn(Uuid::new_v4(), options, transport, &PrintObserver)
        .await
        .context("replay turn failed")?;
    println!();

    print_outcome(&outcome);
    println!();
    print_transcript(&store.all_model_messages_ordered());
    Ok(())
}

fn migrate(file: PathBuf, emit_legacy: bool) -> Result<()> {
    let document = std::fs::read(&file)
        .with_context(|| format!("failed to read history '{}'", file.display()))?;
    let entries: Vec<Option<LegacyEntry>> =
        serde_json::from_slice(&document).context("history file is not a legacy JSON array")?;

    let conversion = to_unified(&entries);
    for warning in &conversion.warnings {
        eprintln!("warning: {warning}");
    }
    conversion
        .validate()
        .context("converted history failed validation")?;

    println!(
        "{} entries -> {} messages ({} skipped)",
        entries.len(),
        conversion.messages.len(),
        conversion.stats.skipped_entries
    );
    let models: Vec<ModelMessage> = conversion.messages.iter().map(|m| m.model.clone()).collect();
    print_transcript(&models);

    if emit_legacy {
        let legacy = to_legacy(&conversion.messages);
        println!(
            "{}",
            serde_json::to_string_pretty(&legacy).context("failed to serialize legacy output")?
        );
    }
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    let reason = match outcome.reason {
        TerminalReason::ToolUse => "tool use",
        TerminalReason::Complete => "complete",
        TerminalReason::Error => "error",
    };
    match &outcome.detail {
        Some(detail) => println!("turn ended: {reason} ({detail})"),
        None => println!("turn ended: {reason}"),
    }
    println!(
        "suppressed duplicates: {}, rejected partials: {}",
        outcome.diagnostics.suppressed_duplicates, outcome.diagnostics.rejected_partials
    );
}

fn print_transcript(messages: &[ModelMessage]) {
    for msg in messages {
        println!("{:>9} | {}", msg.role.as_str(), msg.content.flattened());
    }
}
