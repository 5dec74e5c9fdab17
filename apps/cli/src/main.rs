//! tourledger CLI: incremental tour-interaction ledger.
//!
//! Reads client conversations from the message store, extracts
//! building-level interactions with an LLM, and appends them to a local
//! ledger exactly once per client.

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
