//! Client error types.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Problems found while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// No output calendars are configured.
    #[error("no calendars configured")]
    NoCalendars,

    /// A calendar uses a visibility level that does not exist.
    #[error(
        "calendar '{feed}': unknown visibility '{value}' (expected title_only, busy_only or all_details)"
    )]
    UnknownVisibility { feed: String, value: String },

    /// A calendar has no sources.
    #[error("calendar '{feed}' has no sources")]
    NoSources { feed: String },

    /// Two calendars share a name.
    #[error("calendar '{feed}' is defined more than once")]
    DuplicateFeed { feed: String },

    /// Two calendars would write the same file.
    #[error("calendars '{first}' and '{second}' both write {output}")]
    DuplicateOutput {
        first: String,
        second: String,
        output: String,
    },

    /// The output file name escapes the output directory.
    #[error("calendar '{feed}': output '{output}' must be a plain file name")]
    InvalidOutput { feed: String, output: String },

    /// A source location is not a usable URL.
    #[error("calendar '{feed}', source '{source_name}': invalid location: {reason}")]
    InvalidLocation {
        feed: String,
        source_name: String,
        reason: String,
    },

    /// A secret reference could not be resolved.
    #[error("calendar '{feed}', source '{source_name}': {reason}")]
    UnresolvedSecret {
        feed: String,
        source_name: String,
        reason: String,
    },

    /// A numeric setting is out of range.
    #[error("{key}: {reason}")]
    InvalidSetting { key: &'static str, reason: String },

    /// Several of the above, reported together.
    #[error("invalid configuration:\n{}", list_problems(.0))]
    Invalid(Vec<ConfigError>),
}

fn list_problems(problems: &[ConfigError]) -> String {
    problems
        .iter()
        .map(|p| format!("  - {}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

impl ConfigError {
    /// Folds collected problems into one error, or `None` if there are none.
    pub fn from_problems(mut problems: Vec<ConfigError>) -> Option<Self> {
        match problems.len() {
            0 => None,
            1 => problems.pop(),
            _ => Some(Self::Invalid(problems)),
        }
    }

    /// Returns the individual problems.
    pub fn problems(&self) -> Vec<&ConfigError> {
        match self {
            Self::Invalid(problems) => problems.iter().collect(),
            other => vec![other],
        }
    }
}

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(ConfigError),
    /// The requested calendar is not configured.
    UnknownFeed(String),
    /// The fetcher or runtime could not be set up.
    Setup(String),
    /// Some feeds failed to merge.
    FeedsFailed { failed: usize, total: usize },
    /// IO error.
    Io(io::Error),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {}", err),
            Self::UnknownFeed(name) => write!(f, "no calendar named '{}' is configured", name),
            Self::Setup(msg) => write!(f, "setup failed: {}", msg),
            Self::FeedsFailed { failed, total } => {
                write!(f, "{} of {} calendars failed to merge", failed, total)
            }
            Self::Io(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}
