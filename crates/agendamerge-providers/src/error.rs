//! Error types for source fetching and normalization.
//!
//! Every error here is local to one source (or one entry of a source): the
//! orchestrator logs it with the source and feed name and keeps merging the
//! remaining sources.

use std::fmt;
use thiserror::Error;

/// The category of a source error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceErrorCode {
    /// The source could not be retrieved: connection failure, non-success
    /// status, unreadable file, HTML instead of calendar data.
    Fetch,
    /// The fetch did not complete within the feed's timeout.
    FetchTimeout,
    /// The retrieved bytes are not well-formed calendar data.
    Parse,
    /// An entry has no unique identifier. Only that entry is dropped.
    MissingIdentifier,
    /// An entry lacks a usable start time. Only that entry is dropped.
    InvalidEntry,
}

impl SourceErrorCode {
    /// Returns a short machine-readable name for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch_error",
            Self::FetchTimeout => "fetch_timeout",
            Self::Parse => "parse_error",
            Self::MissingIdentifier => "missing_identifier",
            Self::InvalidEntry => "invalid_entry",
        }
    }
}

impl fmt::Display for SourceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error raised while fetching or normalizing one source feed.
#[derive(Debug, Error)]
pub struct SourceError {
    /// The error code categorizing this error.
    code: SourceErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// Display name of the source the error belongs to.
    source_name: Option<String>,
    /// The underlying cause of this error, if any.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    /// Creates a new source error with the given code and message.
    pub fn new(code: SourceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source_name: None,
            cause: None,
        }
    }

    /// Creates a fetch error.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::Fetch, message)
    }

    /// Creates a fetch timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::FetchTimeout, message)
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::Parse, message)
    }

    /// Creates a missing identifier error.
    pub fn missing_identifier(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::MissingIdentifier, message)
    }

    /// Creates an invalid entry error.
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::new(SourceErrorCode::InvalidEntry, message)
    }

    /// Sets the source name for this error.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Sets the underlying cause for this error.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> SourceErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the source name, if set.
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.source_name {
            write!(f, "[{}] ", name)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;
