// src/error.rs
// =============================================================================
// Error types shared by the cache, the proxy and the crawler.
//
// The variants follow how each failure is handled:
// - ForbiddenHost: request target outside the allowed domain, never retried
// - CacheMiss: offline mode and nothing archived for this URL yet
// - Upstream / UpstreamTimeout: transient; the proxy answers 502/504 and
//   the crawler retries those statuses
// - GatewayUnreachable: the proxy itself is down, aborts a crawl run
// - Extraction: one malformed piece of a page, logged and skipped
// - Storage: cache or side-file I/O
// =============================================================================

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Forbidden host: {0}")]
    ForbiddenHost(String),

    #[error("Offline cache miss - {0} is not archived yet")]
    CacheMiss(String),

    #[error("Upstream fetch of {url} failed: {reason}")]
    Upstream { url: String, reason: String },

    #[error("Upstream fetch of {0} timed out")]
    UpstreamTimeout(String),

    #[error("Cannot reach the proxy at {0} - is it running?")]
    GatewayUnreachable(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ArchiveError {
    pub fn invalid_url(url: &str, reason: impl std::fmt::Display) -> Self {
        ArchiveError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ArchiveError {
    fn from(err: serde_json::Error) -> Self {
        ArchiveError::Storage(format!("JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
