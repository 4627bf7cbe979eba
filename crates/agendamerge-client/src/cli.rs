//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// agendamerge - merge calendar feeds into per-audience feeds
#[derive(Debug, Parser)]
#[command(name = "agendamerge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "AGENDAMERGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Returns the command to run; `sync` of every feed when none is given.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Sync { feed: None })
    }
}

/// Subcommands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Merge and publish all calendars once (default)
    Sync {
        /// Only merge the calendar with this name
        #[arg(long)]
        feed: Option<String>,
    },

    /// Merge on a schedule until stopped (SIGHUP merges immediately)
    Daemon {
        /// Minutes between runs, overriding the configuration
        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// List configured calendars and their published files
    List,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum ConfigAction {
    /// Print the loaded configuration as TOML
    Dump,
    /// Validate the configuration, resolving secrets
    Validate,
    /// Show the configuration file path
    Path,
}
