// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Default)]
struct RefreshMetricsInner {
    fetches_started: AtomicU64,
    fetches_succeeded: AtomicU64,
    fetches_failed: AtomicU64,
    fetches_discarded: AtomicU64,
    ledgers_dropped: AtomicU64,
    ledger_closes: AtomicU64,
    subscription_failures: AtomicU64,
    last_commit: AtomicI64,
}

#[derive(Clone)]
pub struct RefreshMetrics {
    inner: Arc<RefreshMetricsInner>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshMetricsSnapshot {
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    /// Successful fetches superseded by a newer commit for the same network.
    pub fetches_discarded: u64,
    pub ledgers_dropped: u64,
    pub ledger_closes: u64,
    pub subscription_failures: u64,
    pub seconds_since_last_commit: Option<u64>,
}

impl Default for RefreshMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RefreshMetricsInner {
                last_commit: AtomicI64::new(-1),
                ..RefreshMetricsInner::default()
            }),
        }
    }

    pub fn inc_fetches_started(&self) {
        self.inner.fetches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetches_succeeded(&self) {
        self.inner.fetches_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetches_failed(&self) {
        self.inner.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fetches_discarded(&self) {
        self.inner.fetches_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ledgers_dropped(&self, delta: u64) {
        if delta > 0 {
            self.inner.ledgers_dropped.fetch_add(delta, Ordering::Relaxed);
        }
    }

    pub fn inc_ledger_closes(&self) {
        self.inner.ledger_closes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_subscription_failures(&self) {
        self.inner
            .subscription_failures
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_commit(&self) {
        if let Ok(duration) = SystemTime::now().duration_since(UNIX_EPOCH) {
            self.inner
                .last_commit
                .store(duration.as_secs() as i64, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> RefreshMetricsSnapshot {
        let last = self.inner.last_commit.load(Ordering::Relaxed);
        let seconds_since_last_commit = if last < 0 {
            None
        } else {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .ok()
                .and_then(|now| (now.as_secs() as i64).checked_sub(last))
                .filter(|elapsed| *elapsed >= 0)
                .map(|elapsed| elapsed as u64)
        };
        RefreshMetricsSnapshot {
            fetches_started: self.inner.fetches_started.load(Ordering::Relaxed),
            fetches_succeeded: self.inner.fetches_succeeded.load(Ordering::Relaxed),
            fetches_failed: self.inner.fetches_failed.load(Ordering::Relaxed),
            fetches_discarded: self.inner.fetches_discarded.load(Ordering::Relaxed),
            ledgers_dropped: self.inner.ledgers_dropped.load(Ordering::Relaxed),
            ledger_closes: self.inner.ledger_closes.load(Ordering::Relaxed),
            subscription_failures: self.inner.subscription_failures.load(Ordering::Relaxed),
            seconds_since_last_commit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_clones() {
        let metrics = RefreshMetrics::new();
        let clone = metrics.clone();
        metrics.inc_fetches_started();
        clone.inc_fetches_started();
        clone.inc_ledgers_dropped(0);
        clone.inc_ledgers_dropped(3);
        let snap = metrics.snapshot();
        assert_eq!(snap.fetches_started, 2);
        assert_eq!(snap.ledgers_dropped, 3);
        assert_eq!(snap.seconds_since_last_commit, None);

        metrics.mark_commit();
        assert!(metrics.snapshot().seconds_since_last_commit.is_some());
    }
}
