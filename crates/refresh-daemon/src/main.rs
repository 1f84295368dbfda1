//! repo-refresh daemon
//!
//! Keeps a vector-store collection in sync with a fixed list of git
//! repositories: clone, chunk, embed, upsert, clean up, on a cron schedule.
//!
//! # Usage
//!
//! ```bash
//! refresh-daemon start
//! refresh-daemon run-once --repo https://github.com/org/repo --fail-on-error
//! refresh-daemon config
//! ```
//!
//! # Configuration
//!
//! Loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/repo-refresh/config.toml)
//! 3. `--config` file
//! 4. Environment variables (REFRESH_*)
//! 5. CLI flags

use anyhow::Result;
use clap::Parser;

use refresh_daemon::{print_config, run_once, start_daemon, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            start_daemon(cli.config.as_deref(), cli.log_level.as_deref()).await?;
        }
        Commands::RunOnce(args) => {
            run_once(cli.config.as_deref(), cli.log_level.as_deref(), args).await?;
        }
        Commands::Config => {
            print_config(cli.config.as_deref(), cli.log_level.as_deref())?;
        }
    }

    Ok(())
}
