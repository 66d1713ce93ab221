// src/crawl/mod.rs
// =============================================================================
// Crawling the site through the caching proxy.
//
// - frontier: shared queue + visited set
// - fetch: the proxy client and the fetcher trait the workers use
// - retry: backoff loop around one fetch
// - crawler: the worker pool
// - important: the important-link side file
// - seeds: where a run starts
// - harvest: one-shot important-link extraction without crawling, and the
//   cache pass that archives what it found
//
// Every run starts with a pre-flight request to the proxy. If the proxy is
// not there we stop before any task is queued.
// =============================================================================

mod crawler;
mod fetch;
mod frontier;
mod harvest;
mod important;
mod retry;
mod seeds;

pub use crawler::CrawlSummary;
pub use harvest::{CacheReport, HarvestReport};
pub use important::ImportantLinks;
pub use seeds::SeedSources;

use crate::cache::CacheStore;
use crate::config::CrawlSettings;
use crate::error::Result;
use crate::extract::Extractor;
use crawler::Crawler;
use fetch::GatewayClient;
use harvest::{harvest, warm_cache, CACHE_PASS_PAUSE};
use retry::RetryPolicy;
use std::sync::Arc;
use tracing::{info, warn};

/// Checks the proxy is up, collects seeds and runs the crawl until the frontier
/// drains, the proxy goes away, or Ctrl-C.
pub async fn run_crawl(settings: CrawlSettings, sources: &SeedSources) -> Result<CrawlSummary> {
    settings.validate()?;

    let client = GatewayClient::new(&settings)?;
    client.preflight().await?;

    let seeds = sources.collect(&settings.origin)?;
    info!("{} seed URLs", seeds.len());
    for seed in seeds.iter().take(5) {
        info!("  seed {}", seed);
    }

    let important = ImportantLinks::open(&settings.important_file)?;
    info!(
        "{} important links already in {}",
        important.known().await,
        important.path().display()
    );

    let store = match &settings.cache_dir {
        Some(dir) if dir.is_dir() => {
            let store = CacheStore::open(dir)?;
            info!("{} responses already in {}", store.count()?, store.dir().display());
            Some(store)
        }
        Some(dir) => {
            warn!(
                "no proxy cache at {}, already-cached pages will not be counted",
                dir.display()
            );
            None
        }
        None => None,
    };

    let mut crawler = Crawler::new(settings, Arc::new(client)).with_important_links(important);
    if let Some(store) = store {
        crawler = crawler.with_store(store);
    }

    let frontier = crawler.frontier();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight pages");
            frontier.close();
        }
    });

    let summary = crawler.run(&seeds).await;
    interrupt.abort();
    Ok(summary)
}

/// The one-shot harvester behind the `extract` command.
pub async fn run_harvest(settings: &CrawlSettings, urls: &[String]) -> Result<HarvestReport> {
    let client = GatewayClient::new(settings)?;
    client.preflight().await?;

    let extractor = Extractor::new(
        settings.allowed_host(),
        settings.default_max_page,
        settings.max_plausible_page,
    );
    let retry = RetryPolicy::from_settings(settings);
    harvest(&client, &extractor, urls, &retry, settings.concurrency).await
}

/// Requests each URL once through the proxy so it ends up in the cache.
pub async fn run_cache_pass(
    settings: &CrawlSettings,
    urls: &[String],
    concurrency: usize,
) -> Result<CacheReport> {
    let client = GatewayClient::new(settings)?;
    warm_cache(&client, urls, concurrency, CACHE_PASS_PAUSE).await
}
