//! Brain CLI: question answering over a local knowledge base.
//!
//! Extracts search keywords from a question with a local language model,
//! finds the notes that mention them, and answers from those notes.

mod commands;
mod serve;

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
