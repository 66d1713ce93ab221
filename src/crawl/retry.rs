// src/crawl/retry.rs
// =============================================================================
// Retry with exponential backoff.
//
// attempt 0 fails -> wait base, attempt 1 fails -> wait 2*base, ... never
// longer than the cap. `max_attempts` counts every try, the first included.
// A fatal outcome stops immediately.
// =============================================================================

use crate::config::CrawlSettings;
use crate::crawl::fetch::{FetchOutcome, FetchedPage, PageFetcher};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &CrawlSettings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            base: settings.backoff_base,
            cap: settings.backoff_cap,
        }
    }

    /// Wait before the retry that follows failed attempt number `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

#[derive(Debug)]
pub enum Attempted {
    Done(FetchedPage),
    Failed(String),
    Fatal(String),
}

pub async fn fetch_with_retry<F>(fetcher: &F, url: &str, policy: &RetryPolicy) -> Attempted
where
    F: PageFetcher + ?Sized,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        match fetcher.fetch(url).await {
            FetchOutcome::Success(page) => return Attempted::Done(page),
            FetchOutcome::Fatal(reason) => return Attempted::Fatal(reason),
            FetchOutcome::Rejected(reason) => return Attempted::Failed(reason),
            FetchOutcome::Retryable(reason) => {
                if attempt + 1 < attempts {
                    let wait = policy.delay(attempt);
                    warn!(
                        "attempt {}/{} for {} failed: {} (retrying in {:?})",
                        attempt + 1,
                        attempts,
                        url,
                        reason,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                last_error = reason;
            }
        }
    }

    Attempted::Failed(format!("gave up after {} attempts: {}", attempts, last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    // Replays a fixed list of outcomes, then keeps returning the last one
    struct Scripted {
        outcomes: Mutex<VecDeque<FetchOutcome>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(outcomes: Vec<FetchOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl PageFetcher for Scripted {
        async fn fetch(&self, _url: &str) -> FetchOutcome {
            *self.calls.lock() += 1;
            let mut outcomes = self.outcomes.lock();
            if outcomes.len() > 1 {
                outcomes.pop_front().unwrap()
            } else {
                outcomes.front().cloned().unwrap()
            }
        }
    }

    fn page() -> FetchOutcome {
        FetchOutcome::Success(FetchedPage {
            status: 200,
            content_type: "text/html".into(),
            body: String::new(),
        })
    }

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base: Duration::from_millis(1),
            cap: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(10),
        };
        let delays: Vec<u64> = (0..6).map(|a| policy.delay(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(policy.delay(40), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let fetcher = Scripted::new(vec![
            FetchOutcome::Retryable("502".into()),
            FetchOutcome::Retryable("timeout".into()),
            page(),
        ]);
        let result = fetch_with_retry(&fetcher, "u", &fast(5)).await;
        assert!(matches!(result, Attempted::Done(_)));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let fetcher = Scripted::new(vec![FetchOutcome::Retryable("502".into())]);
        let result = fetch_with_retry(&fetcher, "u", &fast(4)).await;
        assert!(matches!(result, Attempted::Failed(_)));
        assert_eq!(fetcher.calls(), 4);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let fetcher = Scripted::new(vec![FetchOutcome::Fatal("refused".into()), page()]);
        let result = fetch_with_retry(&fetcher, "u", &fast(10)).await;
        assert!(matches!(result, Attempted::Fatal(_)));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_is_not_retried() {
        let fetcher = Scripted::new(vec![FetchOutcome::Rejected("bad url".into())]);
        let result = fetch_with_retry(&fetcher, "u", &fast(10)).await;
        assert!(matches!(result, Attempted::Failed(_)));
        assert_eq!(fetcher.calls(), 1);
    }
}
