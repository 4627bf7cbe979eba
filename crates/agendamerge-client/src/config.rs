//! Configuration file handling.
//!
//! The file is read into loosely typed settings and then validated in one
//! pass into [`OutputFeedSpec`]s. Validation reports every problem at once
//! and happens before anything is fetched.

use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use agendamerge_core::{FeedMetadata, OutputFeedSpec, SourceSpec, Visibility, default_output_file};

use crate::error::ConfigError;
use crate::secret::SecretResolver;

/// Location schemes a source may use.
pub const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "webcal", "file"];

/// Top-level configuration.
///
/// Relative paths are taken relative to the directory of the configuration
/// file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the merged feeds are written to.
    pub output_dir: PathBuf,

    /// TOML file holding values for `secret::` references.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets_file: Option<PathBuf>,

    /// Fetch and schedule settings.
    pub sync: SyncSettings,

    /// Output calendars.
    pub calendars: Vec<CalendarSettings>,

    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            secrets_file: None,
            sync: SyncSettings::default(),
            calendars: Vec::new(),
            base_dir: None,
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Timeout for each source fetch.
    pub timeout_seconds: u64,
    /// Interval between daemon runs.
    pub interval_minutes: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 20,
            interval_minutes: 15,
        }
    }
}

/// One `[[calendars]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSettings {
    pub name: String,

    /// Output file name; derived from the name when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default = "default_visibility")]
    pub visibility: String,

    /// Publish entries tagged `[optie]`.
    #[serde(default)]
    pub include_options: bool,

    #[serde(default)]
    pub metadata: FeedMetadata,

    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

fn default_visibility() -> String {
    Visibility::AllDetails.as_str().to_string()
}

impl CalendarSettings {
    /// Returns the file name this calendar is published as.
    pub fn output_file(&self) -> String {
        self.output
            .clone()
            .unwrap_or_else(|| default_output_file(&self.name))
    }
}

/// One `[[calendars.sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    pub name: String,

    /// Feed location or a secret reference to it.
    pub url: String,

    /// Short decoration shown before the source name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl AppConfig {
    /// Loads configuration from the default location.
    ///
    /// A missing file yields the default (empty) configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("agendamerge")
    }

    /// Returns the output directory, resolved against the config file.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    /// Returns the secrets file, resolved against the config file.
    pub fn secrets_path(&self) -> Option<PathBuf> {
        self.secrets_file.as_deref().map(|p| self.resolve_path(p))
    }

    /// Returns the daemon interval.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        interval_from_minutes(self.sync.interval_minutes, "sync.interval_minutes")
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match self.base_dir {
            Some(ref base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Validates the configuration into feed specs, resolving secrets.
    ///
    /// # Errors
    ///
    /// Returns every problem found; a single problem is returned as-is,
    /// several as [`ConfigError::Invalid`].
    pub fn feed_specs(&self) -> Result<Vec<OutputFeedSpec>, ConfigError> {
        let resolver = SecretResolver::new(self.secrets_path());
        let mut problems = Vec::new();

        if self.sync.timeout_seconds == 0 {
            problems.push(ConfigError::InvalidSetting {
                key: "sync.timeout_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if let Err(e) = self.interval() {
            problems.push(e);
        }
        if self.calendars.is_empty() {
            problems.push(ConfigError::NoCalendars);
        }

        let timeout = Duration::from_secs(self.sync.timeout_seconds);
        let mut names = HashSet::new();
        let mut outputs: HashMap<String, &str> = HashMap::new();
        let mut specs = Vec::with_capacity(self.calendars.len());

        for calendar in &self.calendars {
            if !names.insert(calendar.name.as_str()) {
                problems.push(ConfigError::DuplicateFeed {
                    feed: calendar.name.clone(),
                });
            }

            let output = calendar.output_file();
            if !is_plain_file_name(&output) {
                problems.push(ConfigError::InvalidOutput {
                    feed: calendar.name.clone(),
                    output: output.clone(),
                });
            } else {
                match outputs.entry(output.clone()) {
                    Entry::Occupied(first) => problems.push(ConfigError::DuplicateOutput {
                        first: first.get().to_string(),
                        second: calendar.name.clone(),
                        output: output.clone(),
                    }),
                    Entry::Vacant(slot) => {
                        slot.insert(calendar.name.as_str());
                    }
                }
            }

            if calendar.sources.is_empty() {
                problems.push(ConfigError::NoSources {
                    feed: calendar.name.clone(),
                });
            }

            let sources: Vec<SourceSpec> = calendar
                .sources
                .iter()
                .filter_map(|source| match source_spec(&resolver, source) {
                    Ok(spec) => Some(spec),
                    Err(problem) => {
                        problems.push(problem.for_feed(&calendar.name));
                        None
                    }
                })
                .collect();

            let visibility = match calendar.visibility.parse::<Visibility>() {
                Ok(v) => v,
                Err(unknown) => {
                    problems.push(ConfigError::UnknownVisibility {
                        feed: calendar.name.clone(),
                        value: unknown.0,
                    });
                    continue;
                }
            };

            let mut spec = OutputFeedSpec::new(&calendar.name, visibility)
                .with_output_file(output)
                .with_fetch_timeout(timeout)
                .with_include_options(calendar.include_options)
                .with_metadata(calendar.metadata.clone());
            spec.sources = sources;
            specs.push(spec);
        }

        match ConfigError::from_problems(problems) {
            Some(err) => Err(err),
            None => Ok(specs),
        }
    }
}

/// Converts an interval in minutes, rejecting zero and values too large to
/// represent in seconds.
pub fn interval_from_minutes(minutes: u64, key: &'static str) -> Result<Duration, ConfigError> {
    match minutes.checked_mul(60) {
        Some(0) => Err(ConfigError::InvalidSetting {
            key,
            reason: "must be greater than zero".into(),
        }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Err(ConfigError::InvalidSetting {
            key,
            reason: format!("{} minutes is too large", minutes),
        }),
    }
}

/// A source problem before the owning feed is known.
enum SourceProblem {
    Secret { source_name: String, reason: String },
    Location { source_name: String, reason: String },
}

impl SourceProblem {
    fn for_feed(self, feed: &str) -> ConfigError {
        let feed = feed.to_string();
        match self {
            Self::Secret {
                source_name,
                reason,
            } => ConfigError::UnresolvedSecret {
                feed,
                source_name,
                reason,
            },
            Self::Location {
                source_name,
                reason,
            } => ConfigError::InvalidLocation {
                feed,
                source_name,
                reason,
            },
        }
    }
}

fn source_spec(
    resolver: &SecretResolver,
    source: &SourceSettings,
) -> Result<SourceSpec, SourceProblem> {
    let location = resolver
        .resolve(&source.url)
        .map_err(|reason| SourceProblem::Secret {
            source_name: source.name.clone(),
            reason,
        })?;
    let location = parse_location(&location).map_err(|reason| SourceProblem::Location {
        source_name: source.name.clone(),
        reason,
    })?;

    let spec = SourceSpec::new(location, &source.name);
    Ok(match source.emoji.as_deref().map(str::trim) {
        Some(emoji) if !emoji.is_empty() => spec.with_decoration(emoji),
        _ => spec,
    })
}

/// Parses a source location, accepting only [`SUPPORTED_SCHEMES`].
///
/// Error messages never repeat the location, which may embed a token.
pub fn parse_location(value: &str) -> Result<Url, String> {
    let url = Url::parse(value.trim()).map_err(|e| e.to_string())?;
    if SUPPORTED_SCHEMES.contains(&url.scheme()) {
        Ok(url)
    } else {
        Err(format!(
            "unsupported scheme '{}' (expected http, https, webcal or file)",
            url.scheme()
        ))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}
