// src/normalize/domain.rs
// =============================================================================
// Restricts the archive to one site.
//
// A URL is in scope when its host is the allowed host or a subdomain of it:
//   allowed = "example.com"
//   example.com, www.example.com  -> in scope
//   notexample.com, example.com.evil.io -> out of scope
// =============================================================================

use crate::error::{ArchiveError, Result};
use url::Url;

#[derive(Debug, Clone)]
pub struct DomainFilter {
    allowed_host: String,
}

impl DomainFilter {
    pub fn new(allowed_host: &str) -> Self {
        Self {
            allowed_host: allowed_host.trim().trim_end_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn allowed_host(&self) -> &str {
        &self.allowed_host
    }

    pub fn in_scope(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.in_scope_url(&parsed),
            Err(_) => false,
        }
    }

    pub fn in_scope_url(&self, url: &Url) -> bool {
        if url.scheme() != "http" && url.scheme() != "https" {
            return false;
        }
        match url.host_str() {
            Some(host) => self.host_matches(host),
            None => false,
        }
    }

    fn host_matches(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == self.allowed_host
            || host
                .strip_suffix(&self.allowed_host)
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    /// `Ok(())` for in-scope URLs, `ForbiddenHost` otherwise.
    pub fn check(&self, url: &Url) -> Result<()> {
        if self.in_scope_url(url) {
            Ok(())
        } else {
            Err(ArchiveError::ForbiddenHost(
                url.host_str().unwrap_or("<no host>").to_string(),
            ))
        }
    }
}
