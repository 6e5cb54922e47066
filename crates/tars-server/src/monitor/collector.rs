use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One sampled value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Int(v) => write!(f, "{}", v),
            SampleValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for SampleValue {
    fn from(v: i64) -> Self {
        SampleValue::Int(v)
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Text(v)
    }
}

/// Samples produced by one collector on one tick.
pub type Samples = BTreeMap<String, SampleValue>;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("probe unavailable: {0}")]
    Unavailable(String),
}

/// A periodic sampler.
///
/// `get_values` runs on the blocking pool once per report tick. It should
/// finish well within the report interval and return an empty map when
/// its probe has nothing to say.
pub trait Collector: Send + Sync {
    fn name(&self) -> &str;

    fn get_values(&self) -> Result<Samples, CollectorError>;
}

/// Reports `workerNum`, the worker thread count of the current tokio runtime.
#[derive(Debug, Default)]
pub struct WorkerNumCollector;

impl Collector for WorkerNumCollector {
    fn name(&self) -> &str {
        "WorkerNumCollector"
    }

    fn get_values(&self) -> Result<Samples, CollectorError> {
        let mut samples = Samples::new();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let workers = handle.metrics().num_workers();
            samples.insert("workerNum".to_string(), SampleValue::Int(workers as i64));
        }
        Ok(samples)
    }
}

/// Reports `appMemoryUsage`, the resident memory in KiB of every process
/// whose name or command line mentions the server name.
#[derive(Debug)]
pub struct ServiceMemoryCollector {
    server_name: String,
}

impl ServiceMemoryCollector {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
        }
    }
}

impl Collector for ServiceMemoryCollector {
    fn name(&self) -> &str {
        "ServiceMemoryCollector"
    }

    fn get_values(&self) -> Result<Samples, CollectorError> {
        let mut samples = Samples::new();
        if self.server_name.is_empty() {
            return Ok(samples);
        }

        let mut system = sysinfo::System::new();
        system.refresh_processes();

        let mut matched = false;
        let mut total_bytes = 0u64;
        for process in system.processes().values() {
            let hit = process.name().contains(&self.server_name)
                || process.cmd().iter().any(|arg| arg.contains(&self.server_name));
            if hit {
                matched = true;
                total_bytes = total_bytes.saturating_add(process.memory());
            }
        }

        if matched {
            let kib = i64::try_from(total_bytes / 1024).unwrap_or(i64::MAX);
            samples.insert("appMemoryUsage".to_string(), SampleValue::Int(kib));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_num_outside_runtime_is_empty() {
        assert!(WorkerNumCollector.get_values().unwrap().is_empty());
    }

    #[test]
    fn test_worker_num_inside_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(3)
            .build()
            .unwrap();
        let samples = rt.block_on(async { WorkerNumCollector.get_values().unwrap() });
        assert_eq!(samples.get("workerNum"), Some(&SampleValue::Int(3)));
    }

    #[test]
    fn test_memory_of_unknown_service_is_empty() {
        let collector = ServiceMemoryCollector::new("no-such-service-7f3a9c2e");
        assert!(collector.get_values().unwrap().is_empty());
    }

    #[test]
    fn test_memory_of_own_process() {
        // The test binary's command line contains its own name.
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().to_string();
        let samples = ServiceMemoryCollector::new(name).get_values().unwrap();
        assert!(matches!(samples.get("appMemoryUsage"), Some(SampleValue::Int(kib)) if *kib > 0));
    }

    #[test]
    fn test_sample_value_display() {
        assert_eq!(SampleValue::from(12).to_string(), "12");
        assert_eq!(SampleValue::from("x".to_string()).to_string(), "x");
    }
}
