//! Debrief CLI: persona-driven news briefings from an embedding map.
//!
//! Samples one headline per topic cluster, keeps what matters to the
//! reader, and condenses the linked articles into a single briefing.

mod commands;

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
