// src/crawl/fetch.rs
// =============================================================================
// How the crawler talks to the gateway.
//
// The crawler never contacts the origin directly. Every canonical origin URL
// is mapped onto the proxy base with the same path and query, so the proxy
// rebuilds exactly the same string as its cache key:
//   https://site/?mode=ETM&docId=5  ->  http://localhost:5002/?mode=ETM&docId=5
//
// Each fetch is classified for the retry loop:
// - Success: any response except 5xx (404/403 included, the page just ends)
// - Retryable: 5xx from the proxy (upstream failed or timed out), timeouts,
//   other transport errors
// - Rejected: the URL cannot be sent at all, retrying will not help
// - Fatal: the proxy itself refused the connection
// =============================================================================

use crate::config::{CrawlSettings, CRAWLER_USER_AGENT};
use crate::error::{ArchiveError, Result};
use crate::proxy::{decode_text, is_html};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::{Position, Url};

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(5);

/// A page as the crawler sees it.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        is_html(&self.content_type)
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(FetchedPage),
    Retryable(String),
    Rejected(String),
    Fatal(String),
}

/// Anything that can fetch a canonical URL for the crawler.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

pub struct GatewayClient {
    client: Client,
    origin: Url,
    proxy_base: Url,
}

impl GatewayClient {
    pub fn new(settings: &CrawlSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(CRAWLER_USER_AGENT)
            .build()
            .map_err(|e| ArchiveError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            origin: settings.origin.clone(),
            proxy_base: settings.proxy_base.clone(),
        })
    }

    /// Where to request `url` from the proxy.
    ///
    /// URLs on the origin keep their path and query. URLs on another in-scope
    /// host (a subdomain) are sent as a protocol-relative path, which the
    /// proxy resolves back against the origin scheme.
    pub fn proxied_url(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| ArchiveError::invalid_url(url, e))?;
        let base = self.proxy_base.as_str().trim_end_matches('/');
        let path_and_query = &parsed[Position::BeforePath..Position::AfterQuery];

        if authority(&parsed) == authority(&self.origin) {
            Ok(format!("{}{}", base, path_and_query))
        } else {
            Ok(format!("{}//{}{}", base, authority(&parsed), path_and_query))
        }
    }

    /// Asks the proxy for its cache statistics. Any failure means the proxy
    /// is not usable and the crawl must not start.
    pub async fn preflight(&self) -> Result<serde_json::Value> {
        let endpoint = format!("{}/_cache_stats", self.proxy_base.as_str().trim_end_matches('/'));
        let unreachable = |reason: String| {
            ArchiveError::GatewayUnreachable(format!("{} ({})", self.proxy_base, reason))
        };

        let response = self
            .client
            .get(&endpoint)
            .timeout(PREFLIGHT_TIMEOUT)
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unreachable(format!("status {}", response.status())));
        }
        let stats: serde_json::Value = response.json().await.map_err(|e| unreachable(e.to_string()))?;

        info!(
            "proxy is up: {} cached responses, live fallback {}",
            stats["cached_responses"], stats["live_fallback"]
        );
        Ok(stats)
    }
}

#[async_trait]
impl PageFetcher for GatewayClient {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let target = match self.proxied_url(url) {
            Ok(target) => target,
            Err(e) => return FetchOutcome::Rejected(e.to_string()),
        };

        let response = match self
            .client
            .get(&target)
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connect() => {
                return FetchOutcome::Fatal(format!("cannot connect to proxy {}: {}", self.proxy_base, e))
            }
            Err(e) if e.is_timeout() => return FetchOutcome::Retryable(format!("timed out: {}", e)),
            Err(e) => return FetchOutcome::Retryable(e.to_string()),
        };

        let status = response.status();
        if status.is_server_error() {
            let reason = response.text().await.unwrap_or_default();
            return FetchOutcome::Retryable(format!("proxy returned {}: {}", status, reason.trim()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return FetchOutcome::Retryable(format!("reading body: {}", e)),
        };

        debug!("[{}] {} via {}", status.as_u16(), url, target);
        FetchOutcome::Success(FetchedPage {
            status: status.as_u16(),
            body: self.unproxy(&decode_text(&bytes, &content_type)),
            content_type,
        })
    }
}

impl GatewayClient {
    // The proxy rewrote origin links (absolute and protocol-relative) to its
    // own base; map them back so the extractor sees in-scope URLs.
    fn unproxy(&self, body: &str) -> String {
        let proxy = self.proxy_base.as_str().trim_end_matches('/');
        let origin = self.origin.as_str().trim_end_matches('/');
        body.replace(proxy, origin).replace(
            &format!("//{}", authority(&self.proxy_base)),
            &format!("//{}", authority(&self.origin)),
        )
    }
}

fn authority(url: &Url) -> &str {
    &url[Position::BeforeHost..Position::AfterPort]
}
