// src/config.rs
// =============================================================================
// Typed settings for the proxy/viewer and the crawler.
//
// The CLI (src/cli.rs) collects raw strings and numbers; this module turns
// them into validated settings so the rest of the code never re-parses URLs.
// =============================================================================

use crate::error::{ArchiveError, Result};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const GATEWAY_USER_AGENT: &str = "LocalCacheProxy/1.0 (+offline-archiver; respectful)";
pub const CRAWLER_USER_AGENT: &str = "AutoCrawler/1.0 (+respectful; via-proxy)";

pub const DEFAULT_ORIGIN: &str = "https://kiagds.ru";
pub const DEFAULT_PROXY_BASE: &str = "http://localhost:5002";
pub const DEFAULT_VIEWER_BASE: &str = "http://localhost:5003";

/// Settings for the fetch gateway (both the live proxy and the read-only viewer).
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub origin: Url,
    pub allowed_host: String,
    pub local_base: String,
    pub cache_dir: PathBuf,
    pub live_fallback: bool,
    pub timeout: Duration,
    pub user_agent: String,
    // Other base addresses (e.g. the crawl proxy) rewritten to local_base as well
    pub also_rewrite: Vec<String>,
}

impl GatewaySettings {
    pub fn new(
        origin: &str,
        allowed_host: Option<&str>,
        local_base: &str,
        cache_dir: impl Into<PathBuf>,
        live_fallback: bool,
    ) -> Result<Self> {
        let origin = parse_base(origin)?;
        let allowed_host = match allowed_host {
            Some(host) => host.to_string(),
            None => origin
                .host_str()
                .ok_or_else(|| ArchiveError::Config(format!("origin {} has no host", origin)))?
                .to_string(),
        };
        let local_base = parse_base(local_base)?;

        Ok(Self {
            origin,
            allowed_host,
            local_base: trim_base(&local_base),
            cache_dir: cache_dir.into(),
            live_fallback,
            timeout: Duration::from_secs(25),
            user_agent: GATEWAY_USER_AGENT.to_string(),
            also_rewrite: Vec::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_also_rewrite(mut self, bases: Vec<String>) -> Self {
        self.also_rewrite = bases
            .iter()
            .map(|b| b.trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .collect();
        self
    }
}

/// Settings for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub origin: Url,
    pub proxy_base: Url,
    pub concurrency: usize,
    pub delay: Duration,
    pub max_depth: usize,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
    pub auto_pagination: bool,
    pub default_max_page: u32,
    pub max_plausible_page: u32,
    pub important_file: PathBuf,
    pub cache_dir: Option<PathBuf>,
}

impl CrawlSettings {
    pub fn new(origin: &str, proxy_base: &str) -> Result<Self> {
        let origin = parse_base(origin)?;
        if origin.host_str().is_none() {
            return Err(ArchiveError::Config(format!("origin {} has no host", origin)));
        }
        Ok(Self {
            origin,
            proxy_base: parse_base(proxy_base)?,
            concurrency: 4,
            delay: Duration::from_millis(500),
            max_depth: 3,
            max_retries: 10,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            auto_pagination: true,
            default_max_page: 10,
            max_plausible_page: 1000,
            important_file: PathBuf::from("important_links.json"),
            cache_dir: None,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ArchiveError::Config("concurrency must be at least 1".into()));
        }
        if self.max_retries == 0 {
            return Err(ArchiveError::Config("max retries must be at least 1".into()));
        }
        if self.default_max_page == 0 {
            return Err(ArchiveError::Config("default max page must be at least 1".into()));
        }
        Ok(())
    }

    pub fn allowed_host(&self) -> &str {
        self.origin.host_str().unwrap_or_default()
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| ArchiveError::invalid_url(raw, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ArchiveError::Config(format!("{} is not an http(s) URL", raw)));
    }
    Ok(url)
}

// "http://localhost:5002/" -> "http://localhost:5002"
fn trim_base(url: &Url) -> String {
    url.as_str().trim_end_matches('/').to_string()
}
