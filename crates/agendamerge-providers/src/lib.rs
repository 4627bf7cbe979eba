//! Source feeds: fetching and normalization.
//!
//! - [`SourceFetcher`] - retrieves the raw bytes of a source feed
//! - [`HttpFetcher`] - the HTTP(S)/webcal/file implementation
//! - [`normalize_feed`] - the Entry Normalizer, ICS bytes to entries
//! - [`SourceError`] - per-source and per-entry failures
//!
//! ```text
//!  SourceSpec ──fetch──▶ bytes ──normalize_feed──▶ NormalizedFeed
//!                                                   ├─ entries
//!                                                   └─ rejected (logged)
//! ```

pub mod error;
pub mod fetch;
pub mod normalize;

pub use error::{SourceError, SourceErrorCode, SourceResult};
pub use fetch::{BoxFuture, SourceFetcher, USER_AGENT, is_html_page, request_url};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use normalize::{NormalizedFeed, normalize_feed};
