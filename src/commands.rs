//! CLI command definitions
//!
//! Defines the clap commands for the sync harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Download the pinned automation driver if needed and print its path
    Driver {
        /// Driver version prefix (overrides WEBDRIVER_VERSION)
        #[arg(long)]
        version: Option<String>,
    },

    /// Run YAML test scenarios
    Run {
        /// Scenario files or directories containing them
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,

        /// Only run scenarios whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Compare one level of two directory trees
    Compare {
        /// Left tree, usually the vault
        left: PathBuf,

        /// Right tree, usually the remote root share
        right: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical default plugin settings as JSON
    Settings,

    /// Start the remote store, check it answers, and shut it down
    CheckServer,
}
