//! List command: configured calendars and their published files.

use std::fs;

use crate::config::AppConfig;
use crate::error::ClientResult;

/// Prints the configured calendars.
///
/// Secrets are not resolved, so this works without access to them.
pub fn run(config: &AppConfig) -> ClientResult<()> {
    print!("{}", format_list(config));
    Ok(())
}

/// Renders one block per calendar.
pub fn format_list(config: &AppConfig) -> String {
    if config.calendars.is_empty() {
        return "No calendars configured.\n".to_string();
    }

    let output_dir = config.output_dir();
    let mut out = String::new();

    for calendar in &config.calendars {
        let path = output_dir.join(calendar.output_file());
        let published = match fs::metadata(&path) {
            Ok(meta) => format!("{} bytes", meta.len()),
            Err(_) => "not published yet".to_string(),
        };
        let options = if calendar.include_options {
            ", with options"
        } else {
            ""
        };

        out.push_str(&format!(
            "{}\n  visibility: {}{}\n  sources: {}\n  output: {} ({})\n",
            calendar.name,
            calendar.visibility,
            options,
            calendar
                .sources
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            path.display(),
            published
        ));
    }

    out
}
