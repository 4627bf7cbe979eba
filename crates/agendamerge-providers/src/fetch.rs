//! Retrieving the raw bytes of a source feed.
//!
//! [`SourceFetcher`] is the seam between the merge engine and the outside
//! world. [`HttpFetcher`] serves `http`, `https`, `webcal` and `file`
//! locations; tests plug in their own in-memory implementations.
//!
//! Fetchers do not enforce timeouts themselves. The orchestrator wraps every
//! call so each source is cancelled on its own deadline.

use std::future::Future;
use std::pin::Pin;

use agendamerge_core::SourceSpec;
#[cfg(feature = "http")]
use reqwest::header::CONTENT_TYPE;
#[cfg(feature = "http")]
use reqwest::{Client, Response};
#[cfg(feature = "http")]
use tracing::{debug, trace};
use url::Url;

use crate::error::{SourceError, SourceResult};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("agendamerge/", env!("CARGO_PKG_VERSION"));

/// How many leading bytes are searched for `BEGIN:VCALENDAR` when a server
/// claims to return HTML.
const HTML_SNIFF_LEN: usize = 2000;

/// Retrieves the raw bytes of a source feed.
pub trait SourceFetcher: Send + Sync {
    /// Fetches the feed at `source.location`.
    fn fetch<'a>(&'a self, source: &'a SourceSpec) -> BoxFuture<'a, SourceResult<Vec<u8>>>;
}

/// Fetches feeds over HTTP(S) or from the local filesystem.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    /// Creates a fetcher with the default user agent.
    pub fn new() -> SourceResult<Self> {
        Self::with_user_agent(USER_AGENT)
    }

    /// Creates a fetcher sending the given user agent.
    pub fn with_user_agent(user_agent: &str) -> SourceResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| SourceError::fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn fetch_http(&self, url: Url) -> SourceResult<Vec<u8>> {
        trace!(host = ?url.host_str(), "Sending request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::fetch(format!("Request failed: {}", e)).with_cause(e))?;

        handle_response(response).await
    }
}

#[cfg(feature = "http")]
impl SourceFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, source: &'a SourceSpec) -> BoxFuture<'a, SourceResult<Vec<u8>>> {
        Box::pin(async move {
            let url = request_url(&source.location)?;
            debug!(
                source = %source.display_name,
                location = %source.redacted_location(),
                "Fetching source"
            );

            let result = if url.scheme() == "file" {
                read_file(&url).await
            } else {
                self.fetch_http(url).await
            };

            result.map_err(|e| e.with_source_name(&source.display_name))
        })
    }
}

/// Maps a configured location to the URL actually requested.
///
/// `webcal://` is a convention for "subscribe to this over HTTPS".
pub fn request_url(location: &Url) -> SourceResult<Url> {
    match location.scheme() {
        "http" | "https" | "file" => Ok(location.clone()),
        "webcal" => {
            let rest = &location.as_str()["webcal".len()..];
            Url::parse(&format!("https{}", rest))
                .map_err(|e| SourceError::fetch(format!("Invalid webcal location: {}", e)))
        }
        other => Err(SourceError::fetch(format!(
            "Unsupported location scheme: {}",
            other
        ))),
    }
}

#[cfg(feature = "http")]
async fn read_file(url: &Url) -> SourceResult<Vec<u8>> {
    let path = url
        .to_file_path()
        .map_err(|_| SourceError::fetch(format!("Invalid file location: {}", url)))?;

    tokio::fs::read(&path).await.map_err(|e| {
        SourceError::fetch(format!("Failed to read {}: {}", path.display(), e)).with_cause(e)
    })
}

/// Checks the status and extracts the body.
#[cfg(feature = "http")]
async fn handle_response(response: Response) -> SourceResult<Vec<u8>> {
    let status = response.status();
    trace!(status = %status, "Received response");

    if !status.is_success() {
        return Err(SourceError::fetch(format!("Unexpected status {}", status)));
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::fetch(format!("Failed to read response: {}", e)).with_cause(e))?;

    if is_html_page(content_type.as_deref(), &body) {
        return Err(SourceError::fetch(
            "Received an HTML page instead of calendar data",
        ));
    }

    Ok(body.to_vec())
}

/// Returns true for an HTML response without calendar data near the top,
/// typically a login or error page served with status 200.
pub fn is_html_page(content_type: Option<&str>, body: &[u8]) -> bool {
    let declared_html = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !declared_html {
        return false;
    }
    let head = &body[..body.len().min(HTML_SNIFF_LEN)];
    !String::from_utf8_lossy(head).contains("BEGIN:VCALENDAR")
}
