//! zenrag CLI — Zenhub workspace to RAG-record converter.
//!
//! Extracts issues, epics, and their relationships from a workspace API,
//! normalizes them into retrieval-ready JSONL records, and optionally
//! enriches record content through a text-generation API.

mod commands;
mod report;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
