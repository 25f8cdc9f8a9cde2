//! Per-component execution timing.
//!
//! Wrap a unit of work with [`PerformanceMonitor::time`] (async) or
//! [`PerformanceMonitor::time_sync`] and the monitor keeps the latest duration, the call count
//! and a running average per label. [`PerformanceMonitor::summary`] returns a serializable
//! snapshot for diagnostics endpoints.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone)]
struct ComponentStats {
    last_duration: Duration,
    total_duration: Duration,
    total_calls: u64,
    last_run_at: DateTime<Utc>,
}

/// Snapshot of the timings recorded for one label
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTiming {
    pub last_execution_ms: f64,
    pub average_execution_ms: f64,
    pub total_calls: u64,
    pub last_run_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    components: DashMap<String, ComponentStats>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Await `future`, recording how long it took under `label`
    pub async fn time<F, T>(&self, label: &str, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = future.await;
        self.record(label, started.elapsed());
        output
    }

    /// Run `work`, recording how long it took under `label`
    pub fn time_sync<F, T>(&self, label: &str, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let output = work();
        self.record(label, started.elapsed());
        output
    }

    pub fn record(&self, label: &str, elapsed: Duration) {
        debug!(component = label, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "Timed");

        let now = Utc::now();
        self.components
            .entry(label.to_string())
            .and_modify(|stats| {
                stats.last_duration = elapsed;
                stats.total_duration += elapsed;
                stats.total_calls += 1;
                stats.last_run_at = now;
            })
            .or_insert(ComponentStats {
                last_duration: elapsed,
                total_duration: elapsed,
                total_calls: 1,
                last_run_at: now,
            });
    }

    pub fn get(&self, label: &str) -> Option<ComponentTiming> {
        self.components.get(label).map(|stats| snapshot(&stats))
    }

    /// All recorded labels, sorted by name
    pub fn summary(&self) -> BTreeMap<String, ComponentTiming> {
        self.components
            .iter()
            .map(|entry| (entry.key().clone(), snapshot(entry.value())))
            .collect()
    }

    pub fn reset(&self) {
        self.components.clear();
    }
}

fn snapshot(stats: &ComponentStats) -> ComponentTiming {
    let average = stats.total_duration.as_secs_f64() / stats.total_calls.max(1) as f64;
    ComponentTiming {
        last_execution_ms: stats.last_duration.as_secs_f64() * 1000.0,
        average_execution_ms: average * 1000.0,
        total_calls: stats.total_calls,
        last_run_at: stats.last_run_at,
    }
}
