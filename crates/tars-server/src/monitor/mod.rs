//! Periodic process sampling pushed to the property service.
//!
//! A [`Monitor`] owns a list of [`Collector`]s. Each report tick runs all of
//! them, merges their samples into a [`MonitorReport`] and sends one
//! property per sample. Collectors are isolated from each other: one that
//! fails or panics contributes an empty map and the rest are still reported.

mod collector;

pub use collector::{Collector, CollectorError, SampleValue, Samples, ServiceMemoryCollector, WorkerNumCollector};

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tars_client::{PropertyFServant, PropertyHead, PropertyRecord};

use crate::error::{Result, ServerError};

/// Aggregation policy attached to every reported property.
pub const PROPERTY_POLICY: &str = "Avg";

/// How long one report tick waits for its collectors unless configured.
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds a built-in collector from its configured name.
pub fn collector_by_name(name: &str, server_name: &str) -> Result<Box<dyn Collector>> {
    match name {
        "WorkerNumCollector" => Ok(Box::new(WorkerNumCollector)),
        "ServiceMemoryCollector" => Ok(Box::new(ServiceMemoryCollector::new(server_name))),
        other => Err(ServerError::UnknownCollector(other.to_string())),
    }
}

/// Samples of all collectors for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub timestamp_ms: u64,
    pub server_name: String,
    /// Collector name to its samples. Failed collectors map to an empty map.
    pub collectors: BTreeMap<String, Samples>,
}

impl MonitorReport {
    /// All samples in one map. Later collectors win on duplicate names.
    pub fn merged(&self) -> Samples {
        let mut merged = Samples::new();
        for samples in self.collectors.values() {
            merged.extend(samples.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}

pub struct Monitor {
    server_name: String,
    node: String,
    local_ip: String,
    collectors: Arc<Vec<Box<dyn Collector>>>,
    client: Option<Arc<dyn PropertyFServant>>,
    sample_timeout: Duration,
}

impl Monitor {
    /// Creates a monitor for `server_name`.
    ///
    /// `node` is the configured node locator; when it is empty the monitor
    /// never reports.
    pub fn new(server_name: impl Into<String>, node: impl Into<String>, local_ip: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            node: node.into(),
            local_ip: local_ip.into(),
            collectors: Arc::new(Vec::new()),
            client: None,
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
        }
    }

    pub fn with_collectors(mut self, collectors: Vec<Box<dyn Collector>>) -> Self {
        self.collectors = Arc::new(collectors);
        self
    }

    pub fn with_client(mut self, client: Arc<dyn PropertyFServant>) -> Self {
        self.client = Some(client);
        self
    }

    /// Deadline for all collectors of one tick. A collector still running
    /// when it passes contributes an empty map.
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.node.trim().is_empty()
    }

    /// Runs every collector on the calling thread.
    pub fn collect(&self) -> MonitorReport {
        collect_from(&self.collectors, &self.server_name)
    }

    /// Collects on the blocking pool and pushes the result.
    ///
    /// Returns `false` without sampling when no node is configured or no
    /// property client is set. Push failures are logged and swallowed.
    pub async fn report(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let Some(client) = &self.client else {
            return false;
        };

        let report = self.collect_blocking().await;

        let records = self.to_properties(&report);
        if records.is_empty() {
            tracing::debug!("Monitor tick produced no samples");
            return true;
        }

        match client.report_prop_msg(&records).await {
            Ok(_) => tracing::debug!("Reported {} monitor samples", records.len()),
            Err(e) => tracing::warn!("Failed to report {} monitor samples: {}", records.len(), e),
        }
        true
    }

    /// Runs each collector in its own blocking task, all bounded by the
    /// sample timeout.
    async fn collect_blocking(&self) -> MonitorReport {
        let deadline = tokio::time::Instant::now() + self.sample_timeout;
        let tasks: Vec<_> = (0..self.collectors.len())
            .map(|i| {
                let collectors = self.collectors.clone();
                tokio::task::spawn_blocking(move || sample(collectors[i].as_ref()))
            })
            .collect();

        let mut merged = BTreeMap::new();
        for (collector, task) in self.collectors.iter().zip(tasks) {
            let samples = match tokio::time::timeout_at(deadline, task).await {
                Ok(Ok(samples)) => samples,
                Ok(Err(e)) => {
                    tracing::warn!("Collector {} aborted: {}", collector.name(), e);
                    Samples::new()
                }
                Err(_) => {
                    tracing::warn!(
                        "Collector {} still running after {}ms, skipped this tick",
                        collector.name(),
                        self.sample_timeout.as_millis()
                    );
                    Samples::new()
                }
            };
            merged.insert(collector.name().to_string(), samples);
        }

        MonitorReport {
            timestamp_ms: now_ms(),
            server_name: self.server_name.clone(),
            collectors: merged,
        }
    }

    fn to_properties(&self, report: &MonitorReport) -> Vec<PropertyRecord> {
        report
            .merged()
            .into_iter()
            .map(|(name, value)| {
                let head = PropertyHead {
                    module_name: report.server_name.clone(),
                    ip: self.local_ip.clone(),
                    property_name: name,
                };
                PropertyRecord::single(head, PROPERTY_POLICY, value.to_string())
            })
            .collect()
    }
}

/// Samples one collector. Errors and panics yield an empty map.
fn sample(collector: &dyn Collector) -> Samples {
    match catch_unwind(AssertUnwindSafe(|| collector.get_values())) {
        Ok(Ok(samples)) => samples,
        Ok(Err(e)) => {
            tracing::warn!("Collector {} failed: {}", collector.name(), e);
            Samples::new()
        }
        Err(_) => {
            tracing::warn!("Collector {} panicked", collector.name());
            Samples::new()
        }
    }
}

fn collect_from(collectors: &[Box<dyn Collector>], server_name: &str) -> MonitorReport {
    let merged = collectors
        .iter()
        .map(|collector| (collector.name().to_string(), sample(collector.as_ref())))
        .collect();

    MonitorReport {
        timestamp_ms: now_ms(),
        server_name: server_name.to_string(),
        collectors: merged,
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
