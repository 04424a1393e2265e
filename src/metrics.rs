//! Metrics sink for timings and counters.
//!
//! The core never talks to a metrics backend directly; services hold an
//! `Arc<dyn MetricsRecorder>` and embedders plug in their own exporter.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

pub trait MetricsRecorder: Send + Sync {
    fn timing(&self, name: &str, duration: Duration);
    fn incr(&self, name: &str);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsRecorder for NoopMetrics {
    fn timing(&self, _name: &str, _duration: Duration) {}
    fn incr(&self, _name: &str) {}
}

/// Keeps every observation in memory; useful in tests and diagnostics
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    timings: Mutex<Vec<(String, Duration)>>,
    counters: Mutex<HashMap<String, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// All timings recorded under `name`, in order
    pub fn timings(&self, name: &str) -> Vec<Duration> {
        self.timings
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, d)| *d)
            .collect()
    }

    pub fn timing_names(&self) -> Vec<String> {
        self.timings.lock().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }
}

impl MetricsRecorder for InMemoryMetrics {
    fn timing(&self, name: &str, duration: Duration) {
        self.timings.lock().push((name.to_string(), duration));
    }

    fn incr(&self, name: &str) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += 1;
    }
}
