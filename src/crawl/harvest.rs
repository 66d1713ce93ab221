// src/crawl/harvest.rs
// =============================================================================
// One-shot harvest of important links.
//
// Fetches each given page once (with retries) through the proxy and keeps
// every URL that carries both a document id and a page number: the page
// itself, its literal links and the synthetic per-page URLs. Nothing is
// enqueued or followed.
//
// `warm_cache` then requests each newly found link once through the proxy so
// the pages land in the archive without a full crawl.
// =============================================================================

use crate::crawl::fetch::{FetchOutcome, PageFetcher};
use crate::crawl::retry::{fetch_with_retry, Attempted, RetryPolicy};
use crate::error::{ArchiveError, Result};
use crate::extract::Extractor;
use crate::normalize::normalize;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Pause after each cache-pass request
pub const CACHE_PASS_PAUSE: Duration = Duration::from_millis(300);

#[derive(Debug, Default, Serialize)]
pub struct HarvestReport {
    pub pages: usize,
    pub failed: usize,
    pub important: BTreeSet<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct CacheReport {
    pub cached: usize,
    pub failed: usize,
}

// What one page contributed
enum PageHarvest {
    Fetched(BTreeSet<String>),
    Failed(BTreeSet<String>),
    Fatal(String),
}

/// Fetches up to `concurrency` pages at once and collects their important
/// links. Stops at the first sign that the proxy is gone.
pub async fn harvest<F>(
    fetcher: &F,
    extractor: &Extractor,
    urls: &[String],
    retry: &RetryPolicy,
    concurrency: usize,
) -> Result<HarvestReport>
where
    F: PageFetcher + ?Sized,
{
    let total = urls.len();
    let pages = urls.iter().enumerate().map(|(i, raw)| async move {
        let url = normalize(raw);
        let mut important = BTreeSet::new();
        if extractor.is_important(&url) {
            important.insert(url.clone());
        }

        let page = match fetch_with_retry(fetcher, &url, retry).await {
            Attempted::Done(page) => page,
            Attempted::Failed(reason) => {
                warn!("[{}/{}] {}: {}", i + 1, total, url, reason);
                return PageHarvest::Failed(important);
            }
            Attempted::Fatal(reason) => return PageHarvest::Fatal(reason),
        };

        if page.is_html() {
            if let Ok(base) = Url::parse(&url) {
                let found = extractor.extract(&base, &page.body);
                let links = extractor.important_links(&found);
                info!(
                    "[{}/{}] {}: {} docIds, {} important links",
                    i + 1,
                    total,
                    url,
                    found.doc_ids.len(),
                    links.len()
                );
                important.extend(links);
            }
        }
        PageHarvest::Fetched(important)
    });

    let mut results = stream::iter(pages).buffer_unordered(concurrency.max(1));
    let mut report = HarvestReport::default();
    while let Some(result) = results.next().await {
        match result {
            PageHarvest::Fetched(important) => {
                report.pages += 1;
                report.important.extend(important);
            }
            PageHarvest::Failed(important) => {
                report.failed += 1;
                report.important.extend(important);
            }
            PageHarvest::Fatal(reason) => return Err(ArchiveError::GatewayUnreachable(reason)),
        }
    }

    Ok(report)
}

/// Requests every URL once through the proxy so it gets archived. Only a
/// 200 counts as cached; other statuses and transport errors are logged and
/// counted as failed. Stops if the proxy goes away.
pub async fn warm_cache<F>(
    fetcher: &F,
    urls: &[String],
    concurrency: usize,
    pause: Duration,
) -> Result<CacheReport>
where
    F: PageFetcher + ?Sized,
{
    info!("📦 caching {} URLs through the proxy", urls.len());

    let requests = urls.iter().map(|url| async move {
        let outcome = fetcher.fetch(url).await;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        (url, outcome)
    });

    let mut results = stream::iter(requests).buffer_unordered(concurrency.max(1));
    let mut report = CacheReport::default();
    while let Some((url, outcome)) = results.next().await {
        match outcome {
            FetchOutcome::Success(page) if page.status == 200 => {
                report.cached += 1;
                if report.cached % 10 == 0 {
                    info!("cached {}/{}", report.cached, urls.len());
                }
            }
            FetchOutcome::Success(page) => {
                report.failed += 1;
                warn!("[{}] {}", page.status, url);
            }
            FetchOutcome::Retryable(reason) | FetchOutcome::Rejected(reason) => {
                report.failed += 1;
                warn!("cannot cache {}: {}", url, reason);
            }
            FetchOutcome::Fatal(reason) => return Err(ArchiveError::GatewayUnreachable(reason)),
        }
    }

    Ok(report)
}
