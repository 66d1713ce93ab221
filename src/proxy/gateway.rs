// src/proxy/gateway.rs
// =============================================================================
// Serves one inbound GET:
// 1. build the absolute target URL against the origin, reject foreign hosts
// 2. cache hit -> use the stored status/headers/body
// 3. cache miss -> CacheMiss in offline mode, otherwise fetch live, store,
//    and continue as a hit
// 4. textual bodies get their absolute origin references rewritten
// 5. length/encoding headers are recomputed for the bytes we actually send
//
// Live fetch failures are returned as errors and never cached.
// =============================================================================

use crate::cache::{CacheStore, CachedResponse, HeaderList};
use crate::config::GatewaySettings;
use crate::error::{ArchiveError, Result};
use crate::normalize::DomainFilter;
use crate::proxy::rewrite::{is_textual, Rewriter};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

const METHOD: &str = "GET";
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const RECOMPUTED_HEADERS: [&str; 3] = ["content-length", "content-encoding", "transfer-encoding"];

/// What the gateway sends back to the client.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: HeaderList,
    pub body: Vec<u8>,
}

/// Body of GET /_cache_stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub cached_responses: usize,
    pub live_fallback: bool,
    pub origin: String,
}

pub struct Gateway {
    settings: GatewaySettings,
    store: CacheStore,
    filter: DomainFilter,
    rewriter: Rewriter,
    // None in offline mode: the viewer never touches the network
    client: Option<Client>,
}

impl Gateway {
    pub fn new(settings: GatewaySettings) -> Result<Self> {
        let store = CacheStore::open(&settings.cache_dir)?;
        let filter = DomainFilter::new(&settings.allowed_host);
        let rewriter = Rewriter::new(&settings.origin, &settings.local_base, &settings.also_rewrite)?;

        let client = if settings.live_fallback {
            let client = Client::builder()
                .timeout(settings.timeout)
                .user_agent(settings.user_agent.clone())
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .map_err(|e| ArchiveError::Config(format!("HTTP client: {}", e)))?;
            Some(client)
        } else {
            None
        };

        Ok(Self {
            settings,
            store,
            filter,
            rewriter,
            client,
        })
    }

    /// The absolute origin URL for an inbound path and raw query string.
    ///
    /// The returned string is exactly what the cache is keyed by.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<String> {
        let joined = self
            .settings
            .origin
            .join(path)
            .map_err(|e| ArchiveError::invalid_url(path, e))?;

        let target = match query {
            Some(q) if !q.is_empty() => format!("{}?{}", joined, q),
            _ => joined.to_string(),
        };

        let parsed = Url::parse(&target).map_err(|e| ArchiveError::invalid_url(&target, e))?;
        self.filter.check(&parsed)?;
        Ok(target)
    }

    pub async fn get(&self, path: &str, query: Option<&str>) -> Result<GatewayResponse> {
        let target = self.target_url(path, query)?;

        let cached = match self.store.get(METHOD, &target)? {
            Some(hit) => {
                debug!("cache hit {}", target);
                hit
            }
            None => match &self.client {
                Some(client) => self.fetch_live(client, &target).await?,
                None => return Err(ArchiveError::CacheMiss(target)),
            },
        };

        Ok(self.render(cached))
    }

    async fn fetch_live(&self, client: &Client, target: &str) -> Result<CachedResponse> {
        let response = client
            .get(target)
            .send()
            .await
            .map_err(|e| upstream_error(target, e))?;

        let status = response.status().as_u16();
        let headers: HeaderList = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| upstream_error(target, e))?
            .to_vec();

        self.store.put(METHOD, target, status, &headers, &body)?;
        info!("fetched live [{}] {} ({} bytes)", status, target, body.len());

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }

    fn render(&self, cached: CachedResponse) -> GatewayResponse {
        let CachedResponse {
            status,
            headers,
            body,
        } = cached;

        let content_type = headers
            .get("content-type")
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let mut out = headers.without(&RECOMPUTED_HEADERS);
        if out.get("content-type").is_none() {
            out.push("Content-Type", content_type.clone());
        }

        if is_textual(&content_type) {
            let body = self.rewriter.rewrite_body(&body, &content_type);
            out.push("Content-Length", body.len().to_string());
            out.push("Content-Encoding", "identity");
            return GatewayResponse {
                status,
                headers: out,
                body,
            };
        }

        out.push("Content-Length", body.len().to_string());
        GatewayResponse {
            status,
            headers: out,
            body,
        }
    }

    pub fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            cached_responses: self.store.count()?,
            live_fallback: self.settings.live_fallback,
            origin: self.settings.origin.as_str().trim_end_matches('/').to_string(),
        })
    }
}

fn upstream_error(target: &str, error: reqwest::Error) -> ArchiveError {
    if error.is_timeout() {
        warn!("upstream timeout {}", target);
        ArchiveError::UpstreamTimeout(target.to_string())
    } else {
        warn!("upstream failure {}: {}", target, error);
        ArchiveError::Upstream {
            url: target.to_string(),
            reason: error.to_string(),
        }
    }
}
