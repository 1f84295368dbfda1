//! CLI argument parsing for the refresh daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Args, Parser, Subcommand};

/// Repository refresh daemon
///
/// Periodically clones a fixed set of repositories and refreshes their
/// chunks in a vector-store collection.
#[derive(Parser, Debug)]
#[command(name = "refresh-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (in addition to ~/.config/repo-refresh/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until Ctrl+C or SIGTERM
    Start,

    /// Run exactly one refresh cycle and exit
    RunOnce(RunOnceArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOnceArgs {
    /// Repository to refresh (repeatable; replaces the configured list)
    #[arg(long = "repo", value_name = "URL")]
    pub repos: Vec<String>,

    /// Override the target collection name
    #[arg(long)]
    pub collection: Option<String>,

    /// Override the vector store directory
    #[arg(long)]
    pub persist_dir: Option<String>,

    /// Override the fan-out concurrency bound
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Exit non-zero if any repository failed
    #[arg(long)]
    pub fail_on_error: bool,
}
