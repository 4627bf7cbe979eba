//! agendamerge CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use agendamerge_client::cli::{Cli, Command, ConfigAction};
use agendamerge_client::commands;
use agendamerge_client::config::AppConfig;
use agendamerge_client::error::ClientResult;
use agendamerge_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.resolved_command();

    let tracing_config = match command {
        Command::Daemon { .. } => TracingConfig::daemon(),
        _ => TracingConfig::cli(cli.verbose),
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: failed to initialize logging: {}", e);
    }

    match run(&cli, command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, command: Command) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);

    match command {
        Command::Sync { feed } => commands::sync::run(&load(cli)?, feed.as_deref()).await,
        Command::Daemon { interval_minutes } => {
            commands::daemon::run(&load(cli)?, interval_minutes).await
        }
        Command::List => commands::list::run(&load(cli)?),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&load(cli)?, &config_path),
            ConfigAction::Validate => commands::config::validate(&load(cli)?),
            ConfigAction::Path => commands::config::path(&config_path),
        },
    }
}

/// Loads the configuration from `--config`, or the default location.
fn load(cli: &Cli) -> ClientResult<AppConfig> {
    let config = match cli.config {
        Some(ref path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    Ok(config)
}
