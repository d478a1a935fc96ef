// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Outstanding-work counter behind flush-and-wait.
//!
//! Every accepted event adds one unit; the router adds one more per extra
//! destination. Each destination completes its unit exactly once, when the
//! event is written locally or acknowledged by the collector. Waiters are
//! released when the counter reaches zero.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::error;

#[derive(Debug, Default)]
struct Shared {
    pending: Mutex<usize>,
    zero: Condvar,
    notify: Notify,
}

#[derive(Clone, Debug, Default)]
pub struct CompletionTracker {
    shared: Arc<Shared>,
}

impl CompletionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        if n == 0 {
            return;
        }
        #[allow(clippy::expect_used)]
        let mut pending = self.shared.pending.lock().expect("lock poisoned");
        *pending += n;
    }

    /// Completes `n` units. Completing more than is outstanding is a bug in
    /// the caller; the counter saturates at zero instead of wrapping.
    pub fn done(&self, n: usize) {
        if n == 0 {
            return;
        }
        #[allow(clippy::expect_used)]
        let mut pending = self.shared.pending.lock().expect("lock poisoned");
        if n > *pending {
            error!(
                "Completion underflow: {} completed with {} outstanding",
                n, *pending
            );
        }
        *pending = pending.saturating_sub(n);
        if *pending == 0 {
            self.shared.zero.notify_all();
            self.shared.notify.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        #[allow(clippy::expect_used)]
        let pending = self.shared.pending.lock().expect("lock poisoned");
        *pending
    }

    /// Resolves once nothing is outstanding.
    pub async fn wait(&self) {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // register before checking so a concurrent `done` cannot be missed
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Blocks the current thread until nothing is outstanding or `timeout`
    /// elapses. Returns `true` when the counter reached zero.
    pub fn wait_blocking(&self, timeout: Option<Duration>) -> bool {
        #[allow(clippy::expect_used)]
        let pending = self.shared.pending.lock().expect("lock poisoned");
        match timeout {
            Some(timeout) => {
                #[allow(clippy::expect_used)]
                let (pending, _) = self
                    .shared
                    .zero
                    .wait_timeout_while(pending, timeout, |p| *p > 0)
                    .expect("lock poisoned");
                *pending == 0
            }
            None => {
                #[allow(clippy::expect_used)]
                let pending = self
                    .shared
                    .zero
                    .wait_while(pending, |p| *p > 0)
                    .expect("lock poisoned");
                *pending == 0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn test_add_and_done() {
        let tracker = CompletionTracker::new();
        tracker.add(3);
        tracker.done(1);
        assert_eq!(tracker.pending(), 2);
        tracker.done(2);
        assert_eq!(tracker.pending(), 0);
    }

    #[test]
    #[traced_test]
    fn test_underflow_saturates() {
        let tracker = CompletionTracker::new();
        tracker.add(1);
        tracker.done(2);
        assert_eq!(tracker.pending(), 0);
        assert!(logs_contain("Completion underflow"));
    }

    #[test]
    fn test_wait_blocking_times_out() {
        let tracker = CompletionTracker::new();
        tracker.add(1);
        assert!(!tracker.wait_blocking(Some(Duration::from_millis(20))));
        tracker.done(1);
        assert!(tracker.wait_blocking(Some(Duration::from_millis(20))));
    }

    #[test]
    fn test_wait_blocking_released_by_other_thread() {
        let tracker = CompletionTracker::new();
        tracker.add(2);
        let worker = tracker.clone();
        let handle = std::thread::spawn(move || {
            worker.done(1);
            std::thread::sleep(Duration::from_millis(10));
            worker.done(1);
        });
        assert!(tracker.wait_blocking(None));
        handle.join().expect("worker panicked");
    }

    #[tokio::test]
    async fn test_async_wait() {
        let tracker = CompletionTracker::new();
        tracker.wait().await;

        tracker.add(5);
        let worker = tracker.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::task::yield_now().await;
                worker.done(1);
            }
        });
        tokio::time::timeout(Duration::from_secs(5), tracker.wait())
            .await
            .expect("wait did not resolve");
        assert_eq!(tracker.pending(), 0);
    }
}
