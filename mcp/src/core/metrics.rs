//! Registry and request metrics.
//!
//! Counters are kept locally for snapshots and diagnostics, and mirrored to the
//! `metrics` facade so an installed recorder (Prometheus in the binary) exports them.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use metrics::{counter, gauge, histogram};

/// Outcome label for a completed reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    /// Target fetch failed; the registry was left untouched.
    FetchFailed,
    /// A toolset or validation error aborted the pass.
    Failed,
    /// A newer reload had already committed.
    Superseded,
}

impl ReloadOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadOutcome::Applied => "applied",
            ReloadOutcome::FetchFailed => "fetch_failed",
            ReloadOutcome::Failed => "failed",
            ReloadOutcome::Superseded => "superseded",
        }
    }
}

pub struct McpMetrics {
    // Call metrics
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    active_calls: AtomicU64,

    // Reload metrics
    reloads_applied: AtomicU64,
    reloads_failed: AtomicU64,
    reloads_superseded: AtomicU64,
    tools_enabled: AtomicU64,
    prompts_enabled: AtomicU64,

    // Per-name latency tracking
    latencies: DashMap<String, LatencyStats>,
}

impl McpMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            active_calls: AtomicU64::new(0),
            reloads_applied: AtomicU64::new(0),
            reloads_failed: AtomicU64::new(0),
            reloads_superseded: AtomicU64::new(0),
            tools_enabled: AtomicU64::new(0),
            prompts_enabled: AtomicU64::new(0),
            latencies: DashMap::new(),
        }
    }

    pub fn record_call_start(&self) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        self.active_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the end of a call. `name` is the tool name, or the method for non-tool calls.
    pub fn record_call_end(&self, method: &str, name: &str, success: bool, elapsed: Duration) {
        self.active_calls.fetch_sub(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }

        let outcome = if success { "success" } else { "error" };
        counter!(
            "mcp_requests_total",
            "method" => method.to_string(),
            "name" => name.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(
            "mcp_request_duration_seconds",
            "method" => method.to_string(),
            "name" => name.to_string()
        )
        .record(elapsed.as_secs_f64());

        self.latencies
            .entry(name.to_string())
            .or_insert_with(LatencyStats::new)
            .record(elapsed.as_millis() as u64);
    }

    pub fn record_reload(&self, outcome: ReloadOutcome) {
        match outcome {
            ReloadOutcome::Applied => self.reloads_applied.fetch_add(1, Ordering::Relaxed),
            ReloadOutcome::FetchFailed | ReloadOutcome::Failed => {
                self.reloads_failed.fetch_add(1, Ordering::Relaxed)
            }
            ReloadOutcome::Superseded => self.reloads_superseded.fetch_add(1, Ordering::Relaxed),
        };
        counter!("mcp_registry_reloads_total", "outcome" => outcome.as_str()).increment(1);
    }

    pub fn set_enabled(&self, tools: usize, prompts: usize) {
        self.tools_enabled.store(tools as u64, Ordering::Relaxed);
        self.prompts_enabled.store(prompts as u64, Ordering::Relaxed);
        gauge!("mcp_registry_tools_enabled").set(tools as f64);
        gauge!("mcp_registry_prompts_enabled").set(prompts as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            active_calls: self.active_calls.load(Ordering::Relaxed),
            reloads_applied: self.reloads_applied.load(Ordering::Relaxed),
            reloads_failed: self.reloads_failed.load(Ordering::Relaxed),
            reloads_superseded: self.reloads_superseded.load(Ordering::Relaxed),
            tools_enabled: self.tools_enabled.load(Ordering::Relaxed),
            prompts_enabled: self.prompts_enabled.load(Ordering::Relaxed),
        }
    }

    pub fn latency(&self, name: &str) -> Option<LatencySnapshot> {
        self.latencies.get(name).map(|stats| stats.snapshot())
    }
}

impl Default for McpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-name latency statistics.
pub struct LatencyStats {
    count: AtomicU64,
    total_ms: AtomicU64,
    min_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyStats {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            min_ms: AtomicU64::new(u64::MAX),
            max_ms: AtomicU64::new(0),
        }
    }

    fn record(&self, ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_ms.load(Ordering::Relaxed);
        let min = self.min_ms.load(Ordering::Relaxed);

        LatencySnapshot {
            count,
            avg_ms: if count > 0 { total / count } else { 0 },
            min_ms: if min == u64::MAX { 0 } else { min },
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub active_calls: u64,
    pub reloads_applied: u64,
    pub reloads_failed: u64,
    pub reloads_superseded: u64,
    pub tools_enabled: u64,
    pub prompts_enabled: u64,
}

impl MetricsSnapshot {
    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_calls + self.failed_calls;
        if completed == 0 {
            100.0
        } else {
            (self.successful_calls as f64 / completed as f64) * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    pub count: u64,
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}
