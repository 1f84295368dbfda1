//! repo-refresh daemon library exports.
//!
//! - `cli`: command-line parsing with clap
//! - `commands`: start, run-once and config implementations

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, RunOnceArgs};
pub use commands::{load_settings, print_config, run_once, start_daemon, SettingsOverrides};
