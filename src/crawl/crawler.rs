// src/crawl/crawler.rs
// =============================================================================
// The worker pool.
//
// `concurrency` workers share one frontier. Each worker loops:
//   take task -> politeness delay -> fetch with retry -> extract -> enqueue
// so at most `concurrency` fetches are ever in flight, whatever the queue
// depth.
//
// Depth rules for what a page at depth d yields:
//   links and synthetic docId/page URLs  -> d + 1
//   pagination siblings (same URL, other page) -> d
// Pages are only expanded while d < max_depth.
//
// A fatal fetch (proxy unreachable) closes the frontier: nobody takes new
// work, in-flight tasks finish, and the summary is marked aborted.
// =============================================================================

use crate::cache::CacheStore;
use crate::config::CrawlSettings;
use crate::crawl::fetch::{FetchedPage, PageFetcher};
use crate::crawl::frontier::{Frontier, FrontierTask};
use crate::crawl::important::ImportantLinks;
use crate::crawl::retry::{fetch_with_retry, Attempted, RetryPolicy};
use crate::extract::{pagination_siblings, Extractor};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

const CACHE_METHOD: &str = "GET";

/// Final counters of one run. Reported even when the run was aborted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    /// Tasks whose URL was already in the cache before this run fetched it
    pub cached: usize,
    /// Tasks fetched successfully that were not cached before
    pub fetched: usize,
    pub errors: usize,
    /// Distinct URLs enqueued during the run
    pub seen: usize,
    pub important_added: usize,
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

#[derive(Default)]
struct Counters {
    cached: AtomicUsize,
    fetched: AtomicUsize,
    errors: AtomicUsize,
    important_added: AtomicUsize,
}

struct Shared {
    settings: CrawlSettings,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Extractor,
    frontier: Arc<Frontier>,
    store: Option<CacheStore>,
    important: Option<ImportantLinks>,
    retry: RetryPolicy,
    counters: Counters,
    abort_reason: Mutex<Option<String>>,
}

pub struct Crawler {
    shared: Shared,
}

impl Crawler {
    pub fn new(settings: CrawlSettings, fetcher: Arc<dyn PageFetcher>) -> Self {
        let extractor = Extractor::new(
            settings.allowed_host(),
            settings.default_max_page,
            settings.max_plausible_page,
        );
        let retry = RetryPolicy::from_settings(&settings);

        Self {
            shared: Shared {
                settings,
                fetcher,
                extractor,
                frontier: Arc::new(Frontier::new()),
                store: None,
                important: None,
                retry,
                counters: Counters::default(),
                abort_reason: Mutex::new(None),
            },
        }
    }

    /// Counts tasks whose URL is already archived in `store`.
    pub fn with_store(mut self, store: CacheStore) -> Self {
        self.shared.store = Some(store);
        self
    }

    /// Merges important URLs into this side file as they are found.
    pub fn with_important_links(mut self, important: ImportantLinks) -> Self {
        self.shared.important = Some(important);
        self
    }

    /// Handle for stopping the run from outside (Ctrl-C).
    pub fn frontier(&self) -> Arc<Frontier> {
        Arc::clone(&self.shared.frontier)
    }

    pub async fn run(self, seeds: &[String]) -> CrawlSummary {
        let shared = Arc::new(self.shared);
        for seed in seeds {
            if shared.extractor.filter().in_scope(seed) {
                shared.frontier.try_enqueue(seed, 0);
            } else {
                warn!("skipping out-of-scope seed {}", seed);
            }
        }
        info!(
            "crawling {} seeds with {} workers (depth {}, {} attempts per URL)",
            shared.frontier.pending(),
            shared.settings.concurrency,
            shared.settings.max_depth,
            shared.retry.max_attempts
        );

        let mut workers = JoinSet::new();
        for id in 0..shared.settings.concurrency.max(1) {
            let shared = Arc::clone(&shared);
            workers.spawn(async move { shared.work(id).await });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("crawl worker panicked: {}", e);
            }
        }

        shared.summary()
    }
}

impl Shared {
    fn summary(&self) -> CrawlSummary {
        let abort_reason = self.abort_reason.lock().clone();
        CrawlSummary {
            cached: self.counters.cached.load(Ordering::Relaxed),
            fetched: self.counters.fetched.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            seen: self.frontier.seen(),
            important_added: self.counters.important_added.load(Ordering::Relaxed),
            aborted: abort_reason.is_some(),
            abort_reason,
        }
    }

    async fn work(&self, id: usize) {
        while let Some(task) = self.frontier.next().await {
            // Completed on drop, also when the task panics
            let _in_flight = Completion(&self.frontier);
            self.process(&task).await;
        }
        debug!("worker {} done", id);
    }

    async fn process(&self, task: &FrontierTask) {
        let already_cached = self
            .store
            .as_ref()
            .is_some_and(|store| store.contains(CACHE_METHOD, &task.url));
        if already_cached {
            // Still fetched: the page may lead to links we have not seen
            self.counters.cached.fetch_add(1, Ordering::Relaxed);
        }

        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }

        match fetch_with_retry(self.fetcher.as_ref(), &task.url, &self.retry).await {
            Attempted::Done(page) => {
                if !already_cached {
                    self.counters.fetched.fetch_add(1, Ordering::Relaxed);
                }
                info!(
                    "[{}]{} {} (depth {})",
                    page.status,
                    if already_cached { " [cached]" } else { "" },
                    task.url,
                    task.depth
                );
                if task.depth < self.settings.max_depth && page.is_html() {
                    let important = self.expand(task, &page);
                    self.record_important(&important).await;
                }
            }
            Attempted::Failed(reason) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!("failed {}: {}", task.url, reason);
            }
            Attempted::Fatal(reason) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                error!("aborting crawl: {}", reason);
                self.abort_reason.lock().get_or_insert(reason);
                self.frontier.close();
            }
        }
    }

    // Enqueues what the page yields and returns the newly queued important URLs
    fn expand(&self, task: &FrontierTask, page: &FetchedPage) -> BTreeSet<String> {
        let Ok(base) = Url::parse(&task.url) else {
            warn!("cannot parse {} for extraction", task.url);
            return BTreeSet::new();
        };

        let found = self.extractor.extract(&base, &page.body);
        let mut important = BTreeSet::new();
        let mut enqueue = |url: &String, depth: usize| {
            if self.frontier.try_enqueue(url, depth) {
                if self.extractor.is_important(url) {
                    important.insert(url.clone());
                }
                true
            } else {
                false
            }
        };

        let children = found.links.iter().filter(|&url| enqueue(url, task.depth + 1)).count();
        let synthetic = found
            .synthetic
            .iter()
            .filter(|&url| enqueue(url, task.depth + 1))
            .count();

        let mut siblings = 0;
        if self.settings.auto_pagination {
            if let Some(hint) = found.pagination.filter(|hint| hint.max_page > 1) {
                debug!("{}: pagination {:?} up to {}", task.url, hint.kind, hint.max_page);
                siblings = pagination_siblings(&base, hint.max_page, self.extractor.page_param())
                    .iter()
                    .filter(|&url| enqueue(url, task.depth))
                    .count();
            }
        }

        if children + synthetic + siblings > 0 {
            debug!(
                "{}: queued {} links, {} docId pages, {} siblings (seen {})",
                task.url,
                children,
                synthetic,
                siblings,
                self.frontier.seen()
            );
        }
        if !found.doc_ids.is_empty() {
            info!(
                "{}: {} docIds -> {} pages",
                task.url,
                found.doc_ids.len(),
                found.synthetic.len()
            );
        }

        important
    }

    // Written immediately so a crash mid-run keeps what was found so far
    async fn record_important(&self, urls: &BTreeSet<String>) {
        let Some(file) = &self.important else {
            return;
        };
        if urls.is_empty() {
            return;
        }
        match file.merge(urls).await {
            Ok(fresh) if fresh.is_empty() => {}
            Ok(fresh) => {
                let added = fresh.len();
                let total = self.counters.important_added.fetch_add(added, Ordering::Relaxed) + added;
                info!(
                    "added {} important links to {} ({} this run)",
                    added,
                    file.path().display(),
                    total
                );
            }
            Err(e) => warn!("cannot update {}: {}", file.path().display(), e),
        }
    }
}

struct Completion<'a>(&'a Frontier);

impl Drop for Completion<'_> {
    fn drop(&mut self) {
        self.0.complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::HeaderList;
    use crate::crawl::fetch::FetchOutcome;
    use crate::crawl::important;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;

    // In-memory site: URL -> outcome. Unknown URLs are empty HTML pages.
    // Records every call and the highest number of concurrent fetches.
    #[derive(Default)]
    struct FakeSite {
        pages: HashMap<String, FetchOutcome>,
        calls: Mutex<HashMap<String, usize>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
        panic_on: Option<String>,
    }

    impl FakeSite {
        fn html(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(
                url.to_string(),
                FetchOutcome::Success(FetchedPage {
                    status: 200,
                    content_type: "text/html; charset=utf-8".into(),
                    body: body.to_string(),
                }),
            );
            self
        }

        fn outcome(mut self, url: &str, outcome: FetchOutcome) -> Self {
            self.pages.insert(url.to_string(), outcome);
            self
        }

        fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }

        fn fetched(&self) -> BTreeSet<String> {
            self.calls.lock().keys().cloned().collect()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeSite {
        async fn fetch(&self, url: &str) -> FetchOutcome {
            if self.panic_on.as_deref() == Some(url) {
                panic!("fetcher bug on {}", url);
            }
            *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.pages.get(url).cloned().unwrap_or_else(|| {
                FetchOutcome::Success(FetchedPage {
                    status: 200,
                    content_type: "text/html".into(),
                    body: "<p>leaf</p>".into(),
                })
            })
        }
    }

    fn settings() -> CrawlSettings {
        let mut settings = CrawlSettings::new("https://example.com", "http://localhost:5002").unwrap();
        settings.delay = Duration::ZERO;
        settings.backoff_base = Duration::from_millis(1);
        settings.backoff_cap = Duration::from_millis(2);
        settings
    }

    fn seeds(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let site = Arc::new(FakeSite {
            latency: Duration::from_millis(20),
            ..Default::default()
        });
        let mut settings = settings();
        settings.concurrency = 3;

        let urls: Vec<String> = (0..12).map(|i| format!("https://example.com/p{}", i)).collect();
        let summary = Crawler::new(settings, site.clone()).run(&urls).await;

        assert_eq!(summary.fetched, 12);
        assert_eq!(site.max_in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_stall_the_run() {
        let site = Arc::new(FakeSite {
            latency: Duration::from_millis(5),
            panic_on: Some("https://example.com/boom".into()),
            ..Default::default()
        });
        let mut settings = settings();
        settings.concurrency = 2;

        let urls = seeds(&[
            "https://example.com/boom",
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c",
        ]);
        let summary = tokio::time::timeout(Duration::from_secs(5), Crawler::new(settings, site).run(&urls))
            .await
            .expect("crawl must finish after a worker panics");

        assert_eq!(summary.fetched, 3);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_each_url_fetched_once() {
        // a <-> b, both link to c, c links back to a
        let site = Arc::new(
            FakeSite::default()
                .html("https://example.com/a", r#"<a href="/b">b</a><a href="/c">c</a>"#)
                .html("https://example.com/b", r#"<a href="/a">a</a><a href="/c#x">c</a>"#)
                .html("https://example.com/c", r#"<a href="https://example.com/a">a</a>"#),
        );
        let mut settings = settings();
        settings.concurrency = 4;
        settings.max_depth = 10;

        let summary = Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/a", "https://example.com/b"]))
            .await;

        for url in ["https://example.com/a", "https://example.com/b", "https://example.com/c"] {
            assert_eq!(site.calls(url), 1, "{}", url);
        }
        assert_eq!(summary.seen, 3);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.errors, 0);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_exhausted_retries_count_as_error() {
        let site = Arc::new(
            FakeSite::default()
                .html("https://example.com/", r#"<a href="/flaky">x</a><a href="/fine">y</a>"#)
                .outcome("https://example.com/flaky", FetchOutcome::Retryable("502".into())),
        );
        let mut settings = settings();
        settings.max_retries = 3;

        let summary = Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/"]))
            .await;

        assert_eq!(site.calls("https://example.com/flaky"), 3);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.fetched, 2);
        assert!(!summary.aborted);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_aborts_run() {
        let site = Arc::new(
            FakeSite::default().outcome("https://example.com/a", FetchOutcome::Fatal("refused".into())),
        );
        let mut settings = settings();
        settings.concurrency = 1;

        let summary = Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/a", "https://example.com/b", "https://example.com/c"]))
            .await;

        assert!(summary.aborted);
        assert_eq!(summary.abort_reason.as_deref(), Some("refused"));
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.errors, 1);
        assert_eq!(site.calls("https://example.com/a"), 1);
        assert_eq!(site.calls("https://example.com/b"), 0);
    }

    #[tokio::test]
    async fn test_depth_limit_stops_expansion() {
        let site = Arc::new(
            FakeSite::default()
                .html("https://example.com/", r#"<a href="/one">1</a>"#)
                .html("https://example.com/one", r#"<a href="/two">2</a>"#)
                .html("https://example.com/two", r#"<a href="/three">3</a>"#),
        );
        let mut settings = settings();
        settings.max_depth = 2;

        Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/"]))
            .await;

        assert_eq!(
            site.fetched(),
            ["https://example.com/", "https://example.com/one", "https://example.com/two"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[tokio::test]
    async fn test_pagination_siblings_keep_depth() {
        // A five-page listing. Only page 1 is a seed, and with max_depth 1 its
        // children are fetched but never expanded. Siblings stay at depth 0,
        // so every page's items are reached even though the chain is long.
        let mut site = FakeSite::default();
        for page in 1..=5 {
            let body = format!(
                r#"<p>Page {} of 5</p><a href="/item{}">item</a>"#,
                page, page
            );
            site = site
                .html(&format!("https://example.com/list?page={}", page), &body)
                .html(
                    &format!("https://example.com/item{}", page),
                    &format!(r#"<a href="/deep{}">deeper</a>"#, page),
                );
        }
        let site = Arc::new(site);
        let mut settings = settings();
        settings.max_depth = 1;

        let summary = Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/list?page=1"]))
            .await;

        for page in 1..=5 {
            assert_eq!(site.calls(&format!("https://example.com/list?page={}", page)), 1);
            assert_eq!(site.calls(&format!("https://example.com/item{}", page)), 1);
            assert_eq!(site.calls(&format!("https://example.com/deep{}", page)), 0);
        }
        assert_eq!(summary.seen, 10);
    }

    #[tokio::test]
    async fn test_synthetic_urls_go_one_level_deeper() {
        let site = Arc::new(FakeSite::default().html(
            "https://example.com/?mode=ETM",
            r#"<span onclick="ajaxHref('?mode=ETM&docId=7')">doc</span>"#,
        ));
        let mut settings = settings();
        settings.max_depth = 1;
        settings.default_max_page = 3;

        let summary = Crawler::new(settings, site.clone())
            .run(&seeds(&["https://example.com/?mode=ETM"]))
            .await;

        for page in 1..=3 {
            let url = format!("https://example.com/?mode=ETM&docId=7&page={}", page);
            assert_eq!(site.calls(&url), 1, "{}", url);
        }
        // seed + literal docId link + three synthetic pages
        assert_eq!(summary.seen, 5);
    }

    #[tokio::test]
    async fn test_important_links_are_merged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("important_links.json");
        let site = Arc::new(FakeSite::default().html(
            "https://example.com/?mode=ETM",
            r#"<a href="?mode=ETM&docId=3&page=1">first</a><a href="/about">about</a>"#,
        ));
        let mut settings = settings();
        settings.default_max_page = 2;

        let summary = Crawler::new(settings, site)
            .with_important_links(ImportantLinks::open(&path).unwrap())
            .run(&seeds(&["https://example.com/?mode=ETM"]))
            .await;

        let saved = important::load(&path).unwrap();
        assert!(saved.contains("https://example.com/?mode=ETM&docId=3&page=1"));
        assert!(!saved.contains("https://example.com/about"));
        assert_eq!(summary.important_added, saved.len());
    }

    #[tokio::test]
    async fn test_already_cached_urls_are_counted_and_refetched() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        store
            .put("GET", "https://example.com/", 200, &HeaderList::new(), b"old")
            .unwrap();

        let site = Arc::new(FakeSite::default().html("https://example.com/", r#"<a href="/new">n</a>"#));
        let summary = Crawler::new(settings(), site.clone())
            .with_store(store)
            .run(&seeds(&["https://example.com/"]))
            .await;

        assert_eq!(summary.cached, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(site.calls("https://example.com/new"), 1);
    }
}
