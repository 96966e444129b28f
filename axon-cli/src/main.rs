//! Axon CLI - offline front-end for the Axon streaming core.
//!
//! `axon replay` drives a captured SSE response body through the full
//! streaming pipeline; `axon migrate` converts a legacy history
//! document into the unified dual-record shape.

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::{Commands, handle_command};

/// Axon CLI - streaming core replay and migration tools
#[derive(Parser)]
#[command(name = "axon")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    handle_command(args.command).await
}
