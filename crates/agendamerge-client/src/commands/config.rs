//! Configuration commands.

use std::path::Path;

use crate::config::AppConfig;
use crate::error::ClientResult;

/// Dump the loaded configuration to stdout.
///
/// Secret references are printed as written, never resolved.
pub fn dump(config: &AppConfig, path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config).map_err(|e| {
        crate::error::ClientError::Setup(format!("failed to serialize config: {}", e))
    })?;
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration, resolving every secret.
pub fn validate(config: &AppConfig) -> ClientResult<()> {
    let specs = config.feed_specs()?;
    let sources: usize = specs.iter().map(|s| s.sources.len()).sum();
    println!(
        "Configuration is valid: {} calendars, {} sources.",
        specs.len(),
        sources
    );
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: &Path) -> ClientResult<()> {
    println!("config: {}", path.display());
    Ok(())
}
