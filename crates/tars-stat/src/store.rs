use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tars_client::{StatKey, StatSnapshot};

/// Configuration for the stat table.
///
/// # Example
///
/// ```rust
/// use tars_stat::StatConfig;
///
/// let config = StatConfig {
///     stale_windows: 5, // keep idle keys for five report windows
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatConfig {
    /// Consecutive idle flushes after which a key is evicted.
    ///
    /// Zero disables eviction.
    pub stale_windows: u32,
    /// Maximum number of sampled calls buffered between two reports.
    ///
    /// Samples arriving while the queue is full are dropped.
    pub sample_capacity: usize,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            stale_windows: 3,
            sample_capacity: 1024,
        }
    }
}

/// How a dispatched call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Timeout,
    Exception,
}

/// Counters for one key.
///
/// Every field is an independent atomic. `record()` only ever adds, and
/// `take()` resets each counter with a single `swap`, so an increment that
/// races a flush is reported either in this window or in the next one.
#[derive(Debug)]
struct StatEntry {
    success: AtomicU64,
    timeout: AtomicU64,
    exception: AtomicU64,
    total_rsp_time: AtomicU64,
    max_rsp_time: AtomicU64,
    min_rsp_time: AtomicU64,
    /// Consecutive flushes that found no activity.
    idle_windows: AtomicU32,
}

impl Default for StatEntry {
    fn default() -> Self {
        Self {
            success: AtomicU64::new(0),
            timeout: AtomicU64::new(0),
            exception: AtomicU64::new(0),
            total_rsp_time: AtomicU64::new(0),
            max_rsp_time: AtomicU64::new(0),
            min_rsp_time: AtomicU64::new(u64::MAX),
            idle_windows: AtomicU32::new(0),
        }
    }
}

impl StatEntry {
    fn record(&self, outcome: Outcome, elapsed_ms: u64) {
        // Timing goes in before the outcome counter: a flush that sees the
        // count has seen the elapsed time too, or will carry it next window.
        self.total_rsp_time.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.max_rsp_time.fetch_max(elapsed_ms, Ordering::Relaxed);
        self.min_rsp_time.fetch_min(elapsed_ms, Ordering::Relaxed);

        let counter = match outcome {
            Outcome::Success => &self.success,
            Outcome::Timeout => &self.timeout,
            Outcome::Exception => &self.exception,
        };
        counter.fetch_add(1, Ordering::AcqRel);
        self.idle_windows.store(0, Ordering::Relaxed);
    }

    fn has_activity(&self) -> bool {
        self.success.load(Ordering::Acquire) > 0
            || self.timeout.load(Ordering::Acquire) > 0
            || self.exception.load(Ordering::Acquire) > 0
    }

    /// Reads and resets the window. Returns `None` when it had no calls.
    fn take(&self) -> Option<StatSnapshot> {
        let count = self.success.swap(0, Ordering::AcqRel);
        let timeout_count = self.timeout.swap(0, Ordering::AcqRel);
        let exec_count = self.exception.swap(0, Ordering::AcqRel);
        let total_rsp_time = self.total_rsp_time.swap(0, Ordering::AcqRel);
        let max_rsp_time = self.max_rsp_time.swap(0, Ordering::AcqRel);
        let min_rsp_time = self.min_rsp_time.swap(u64::MAX, Ordering::AcqRel);

        let total_count = count + timeout_count + exec_count;
        if total_count == 0 {
            // A racing record may have added timing before its counter;
            // put it back so the next window carries it.
            if total_rsp_time > 0 {
                self.total_rsp_time.fetch_add(total_rsp_time, Ordering::Relaxed);
                self.max_rsp_time.fetch_max(max_rsp_time, Ordering::Relaxed);
            }
            if min_rsp_time != u64::MAX {
                self.min_rsp_time.fetch_min(min_rsp_time, Ordering::Relaxed);
            }
            return None;
        }

        Some(StatSnapshot {
            count,
            timeout_count,
            exec_count,
            total_count,
            total_rsp_time,
            max_rsp_time,
            min_rsp_time: if min_rsp_time == u64::MAX { 0 } else { min_rsp_time },
        })
    }
}

/// Concurrent table of call statistics keyed by [`StatKey`].
///
/// The table is a sharded map of per-key atomic counters. Recording touches
/// only the shard that holds the key, and only under a read lock once the
/// key exists, so request workers never serialize on a global lock.
///
/// # Eviction
///
/// Each flush that finds a key idle bumps its idle count. Once a key has
/// been idle for [`StatConfig::stale_windows`] consecutive flushes it is
/// removed. Removal re-checks the counters under the shard write lock, so a
/// `record()` that lands concurrently either keeps the entry alive or
/// creates a fresh one; it is never written into a removed entry.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use tars_client::StatKey;
/// use tars_stat::{Outcome, StatStore};
///
/// let store = StatStore::default();
/// let key = StatKey { interface_name: "echo".into(), ..Default::default() };
///
/// store.record(&key, Outcome::Success, Duration::from_millis(3));
/// store.record(&key, Outcome::Exception, Duration::from_millis(9));
///
/// let window = store.flush();
/// assert_eq!(window.len(), 1);
/// assert_eq!(window[0].1.total_count, 2);
/// assert!(store.flush().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct StatStore {
    entries: DashMap<StatKey, StatEntry>,
    config: StatConfig,
}

impl StatStore {
    pub fn new(config: StatConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &StatConfig {
        &self.config
    }

    /// Records one finished call.
    pub fn record(&self, key: &StatKey, outcome: Outcome, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if let Some(entry) = self.entries.get(key) {
            entry.record(outcome, elapsed_ms);
            return;
        }
        self.entries.entry(key.clone()).or_default().record(outcome, elapsed_ms);
    }

    /// Reads and resets every key with activity since the last flush.
    ///
    /// Keys without activity are left out of the result and aged towards
    /// eviction.
    pub fn flush(&self) -> Vec<(StatKey, StatSnapshot)> {
        let mut window = Vec::new();
        let mut stale = Vec::new();

        for entry in self.entries.iter() {
            match entry.value().take() {
                Some(snapshot) => {
                    entry.value().idle_windows.store(0, Ordering::Relaxed);
                    window.push((entry.key().clone(), snapshot));
                }
                None => {
                    let idle = entry.value().idle_windows.fetch_add(1, Ordering::Relaxed) + 1;
                    if self.config.stale_windows > 0 && idle >= self.config.stale_windows {
                        stale.push(entry.key().clone());
                    }
                }
            }
        }

        // Shard locks from the iteration above must be released before removal.
        for key in stale {
            let stale_windows = self.config.stale_windows;
            let removed = self.entries.remove_if(&key, |_, entry| {
                !entry.has_activity() && entry.idle_windows.load(Ordering::Relaxed) >= stale_windows
            });
            if removed.is_some() {
                tracing::debug!("Evicted idle stat key {}::{}", key.slave_name(), key.interface_name);
            }
        }

        window
    }

    /// Number of keys currently tracked, idle ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
