//! ## sleuth-cli
//! **`sleuth` binary**
//!
//! Live capture, pcap replay and interface listing over the analytics
//! service, printing control responses and stream messages as JSON lines.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    commands::run_command(Cli::parse()).await
}
