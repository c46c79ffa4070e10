//! Debounced lookups with latest-wins ordering
//!
//! Every call takes a ticket from a monotonically increasing sequence.
//! A call waits out the debounce window and only issues its lookup if no
//! newer ticket was taken meanwhile. Once the lookup returns, its result
//! is only handed back if it still carries the newest ticket, so a slow
//! response can never overwrite a fresher one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// What became of a debounced call
#[derive(Debug, PartialEq)]
pub enum Debounced<T> {
    /// Lookup ran and is still the newest
    Latest(T),
    /// A newer call arrived inside the window; no lookup was issued
    Superseded,
    /// Lookup ran but a newer one was issued before it returned
    Stale,
}

impl<T> Debounced<T> {
    pub fn is_latest(&self) -> bool {
        matches!(self, Debounced::Latest(_))
    }
}

pub struct Debouncer {
    window: Duration,
    /// Newest ticket handed out (0 = none yet)
    latest: AtomicU64,
    /// Ticket of the lookup currently in flight (0 = none)
    in_flight: AtomicU64,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            latest: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Wait out the window, then run `lookup` if this is still the newest call
    pub async fn run<F, Fut, T>(&self, lookup: F) -> Debounced<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(self.window).await;
        if !self.is_current(ticket) {
            return Debounced::Superseded;
        }

        self.in_flight.store(ticket, Ordering::SeqCst);
        let output = lookup().await;
        let _ = self
            .in_flight
            .compare_exchange(ticket, 0, Ordering::SeqCst, Ordering::SeqCst);

        if self.is_current(ticket) {
            Debounced::Latest(output)
        } else {
            tracing::debug!(ticket = ticket, "Discarding stale lookup result");
            Debounced::Stale
        }
    }

    /// Supersede every pending and in-flight call
    pub fn cancel(&self) {
        self.latest.fetch_add(1, Ordering::SeqCst);
    }

    /// True only while the most recently started lookup is outstanding
    pub fn is_loading(&self) -> bool {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        in_flight != 0 && in_flight == self.latest.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_issues_single_lookup() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..5u64 {
            let debouncer = debouncer.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                debouncer
                    .run(|| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        i
                    })
                    .await
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes.pop(), Some(Debounced::Latest(4)));
        assert!(outcomes.iter().all(|o| *o == Debounced::Superseded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_is_discarded_after_fresher_one() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));

        let slow = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move {
                debouncer
                    .run(|| async {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        "slow"
                    })
                    .await
            })
        };

        // Let the first lookup start, then issue a faster one
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(debouncer.is_loading());

        let fast = debouncer.run(|| async { "fast" }).await;
        assert_eq!(fast, Debounced::Latest("fast"));
        assert!(!debouncer.is_loading());

        assert_eq!(slow.await.unwrap(), Debounced::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_supersedes_pending_call() {
        let debouncer = Arc::new(Debouncer::new(Duration::from_millis(500)));
        let pending = {
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.run(|| async { 1 }).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.cancel();

        assert_eq!(pending.await.unwrap(), Debounced::Superseded);
        assert!(!debouncer.is_loading());
    }
}
