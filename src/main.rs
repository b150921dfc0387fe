//! Sync harness CLI - end-to-end checks for the WebDAV sync plugin
//!
//! Drives the desktop application through WebDriver against a local WebDAV
//! server and checks what the plugin did to both trees.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use harness::common::logging;
use harness::{cli, commands};

#[derive(Parser)]
#[command(name = "sync-harness", about = "End-to-end harness for the WebDAV sync plugin")]
#[command(version, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./harness.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Run { .. }) {
        logging::init_cli();
    }

    if let Err(e) = cli::dispatch(cli.command, cli.config.as_deref()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
