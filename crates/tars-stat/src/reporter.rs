use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tars_client::{SampleRecord, StatFServant, StatKey, StatSnapshot};

use crate::store::{Outcome, StatConfig, StatStore};

/// Drives the stat table: records calls, buffers sampled calls, and pushes
/// each window to the stat service.
///
/// Reporting never retries. A failed push drops that window's data and logs
/// the failure, so telemetry can never apply backpressure to request serving.
pub struct Stat {
    store: StatStore,
    client: Arc<dyn StatFServant>,
    samples: Mutex<VecDeque<SampleRecord>>,
    sample_capacity: usize,
}

impl Stat {
    pub fn new(config: StatConfig, client: Arc<dyn StatFServant>) -> Self {
        let sample_capacity = config.sample_capacity;
        Self {
            store: StatStore::new(config),
            client,
            samples: Mutex::new(VecDeque::new()),
            sample_capacity,
        }
    }

    pub fn store(&self) -> &StatStore {
        &self.store
    }

    /// Records one finished call.
    pub fn record(&self, key: &StatKey, outcome: Outcome, elapsed: Duration) {
        self.store.record(key, outcome, elapsed);
    }

    /// Queues a sampled call for the next [`Stat::report_samples`].
    ///
    /// Returns `false` when the queue is full and the sample was dropped.
    pub fn push_sample(&self, sample: SampleRecord) -> bool {
        let mut samples = self.samples.lock();
        if samples.len() >= self.sample_capacity {
            return false;
        }
        samples.push_back(sample);
        true
    }

    /// Number of buffered samples.
    pub fn pending_samples(&self) -> usize {
        self.samples.lock().len()
    }

    /// Flushes the table and reports the window in one call.
    ///
    /// Returns the flushed window, whether or not the push succeeded.
    pub async fn report(&self) -> Vec<(StatKey, StatSnapshot)> {
        let window = self.store.flush();
        if window.is_empty() {
            return window;
        }

        match self.client.report_mic_msg(&window, false).await {
            Ok(ret) if ret != 0 => {
                tracing::warn!("Stat service returned {} for {} keys", ret, window.len());
            }
            Ok(_) => {
                tracing::debug!("Reported stat window with {} keys", window.len());
            }
            Err(e) => {
                tracing::warn!("Failed to report stat window of {} keys: {}", window.len(), e);
            }
        }
        window
    }

    /// Drains the sample queue and reports it in one call.
    ///
    /// Returns the number of samples drained.
    pub async fn report_samples(&self) -> usize {
        let batch: Vec<SampleRecord> = self.samples.lock().drain(..).collect();
        if batch.is_empty() {
            return 0;
        }

        if let Err(e) = self.client.report_sample_msg(&batch).await {
            tracing::warn!("Failed to report {} sampled calls: {}", batch.len(), e);
        }
        batch.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tars_common::protocol::error::{Result, TarsError};

    #[derive(Default)]
    struct RecordingStat {
        windows: Mutex<Vec<Vec<(StatKey, StatSnapshot)>>>,
        samples: Mutex<Vec<SampleRecord>>,
    }

    #[async_trait]
    impl StatFServant for RecordingStat {
        async fn report_mic_msg(&self, msg: &[(StatKey, StatSnapshot)], from_client: bool) -> Result<i32> {
            assert!(!from_client);
            self.windows.lock().push(msg.to_vec());
            Ok(0)
        }

        async fn report_sample_msg(&self, msg: &[SampleRecord]) -> Result<i32> {
            self.samples.lock().extend_from_slice(msg);
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FailingStat {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatFServant for FailingStat {
        async fn report_mic_msg(&self, _msg: &[(StatKey, StatSnapshot)], _from_client: bool) -> Result<i32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TarsError::Connection("stat service down".into()))
        }

        async fn report_sample_msg(&self, _msg: &[SampleRecord]) -> Result<i32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TarsError::Connection("stat service down".into()))
        }
    }

    fn key(interface: &str) -> StatKey {
        StatKey {
            interface_name: interface.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_report_sends_one_batch() {
        let client = Arc::new(RecordingStat::default());
        let stat = Stat::new(StatConfig::default(), client.clone());

        stat.record(&key("a"), Outcome::Success, Duration::from_millis(2));
        stat.record(&key("b"), Outcome::Timeout, Duration::from_millis(2));

        let window = stat.report().await;
        assert_eq!(window.len(), 2);

        let windows = client.windows.lock();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 2);
    }

    #[tokio::test]
    async fn test_empty_window_is_not_sent() {
        let client = Arc::new(RecordingStat::default());
        let stat = Stat::new(StatConfig::default(), client.clone());

        assert!(stat.report().await.is_empty());
        assert!(client.windows.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failing_reporter_still_resets() {
        let client = Arc::new(FailingStat::default());
        let stat = Stat::new(StatConfig::default(), client.clone());

        stat.record(&key("a"), Outcome::Success, Duration::ZERO);
        assert_eq!(stat.report().await.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        // The dropped window is gone; new records start from zero.
        stat.record(&key("a"), Outcome::Exception, Duration::ZERO);
        let window = stat.report().await;
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].1.total_count, 1);
        assert_eq!(window[0].1.exec_count, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_samples_are_bounded_and_drained() {
        let client = Arc::new(RecordingStat::default());
        let stat = Stat::new(
            StatConfig {
                sample_capacity: 2,
                ..Default::default()
            },
            client.clone(),
        );

        assert!(stat.push_sample(SampleRecord::default()));
        assert!(stat.push_sample(SampleRecord::default()));
        assert!(!stat.push_sample(SampleRecord::default()));
        assert_eq!(stat.pending_samples(), 2);

        assert_eq!(stat.report_samples().await, 2);
        assert_eq!(stat.pending_samples(), 0);
        assert_eq!(client.samples.lock().len(), 2);
        assert_eq!(stat.report_samples().await, 0);
    }

    #[tokio::test]
    async fn test_failed_sample_report_drops_batch() {
        let client = Arc::new(FailingStat::default());
        let stat = Stat::new(StatConfig::default(), client.clone());

        stat.push_sample(SampleRecord::default());
        assert_eq!(stat.report_samples().await, 1);
        assert_eq!(stat.pending_samples(), 0);
    }
}
