// src/crawl/frontier.rs
// =============================================================================
// The shared work queue of a crawl run.
//
// - `try_enqueue` checks the visited set and inserts under one lock, so a
//   URL is enqueued at most once per run no matter how many workers find it.
// - `next` hands out tasks and counts them as in flight until `complete`.
// - The run is over when the queue is empty and nothing is in flight, or
//   when the frontier has been closed (Ctrl-C or a fatal gateway error).
// =============================================================================

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tokio::sync::Notify;

/// One unit of work: a canonical URL and how far it is from a seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierTask {
    pub url: String,
    pub depth: usize,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<FrontierTask>,
    visited: HashSet<String>,
    in_flight: usize,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct Frontier {
    state: Mutex<State>,
    changed: Notify,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `url` unless it was seen before or the frontier is closed.
    /// Returns whether the task was queued.
    pub fn try_enqueue(&self, url: &str, depth: usize) -> bool {
        {
            let mut state = self.state.lock();
            if state.closed || !state.visited.insert(url.to_string()) {
                return false;
            }
            state.queue.push_back(FrontierTask {
                url: url.to_string(),
                depth,
            });
        }
        self.changed.notify_waiters();
        true
    }

    /// Waits for the next task. `None` means the run is over.
    pub async fn next(&self) -> Option<FrontierTask> {
        loop {
            // Register interest before looking at the state so a wakeup
            // between the check and the await is not lost.
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(task) = state.queue.pop_front() {
                    state.in_flight += 1;
                    return Some(task);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }

            changed.await;
        }
    }

    /// Marks one task handed out by `next` as finished.
    pub fn complete(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.changed.notify_waiters();
    }

    /// Stops handing out work. Queued tasks are dropped, in-flight tasks
    /// may still finish and call `complete`.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_waiters();
    }

    /// Distinct URLs ever enqueued.
    pub fn seen(&self) -> usize {
        self.state.lock().visited.len()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}
