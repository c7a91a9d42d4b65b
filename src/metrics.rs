//! Prometheus exporter for the registry and request metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::error::{AppError, AppResult};

/// Install the global recorder. `/metrics` renders from the returned handle.
pub fn install() -> AppResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Telemetry(format!("failed to install Prometheus recorder: {e}")))?;
    describe();
    Ok(handle)
}

fn describe() {
    describe_counter!(
        "mcp_requests_total",
        "Tool calls and prompt requests by method, name and outcome"
    );
    describe_histogram!(
        "mcp_request_duration_seconds",
        Unit::Seconds,
        "Time spent serving a tool call or prompt request"
    );
    describe_counter!(
        "mcp_registry_reloads_total",
        "Registry reload passes by outcome"
    );
    describe_gauge!(
        "mcp_registry_tools_enabled",
        "Tools exposed after the last committed reload"
    );
    describe_gauge!(
        "mcp_registry_prompts_enabled",
        "Prompts exposed after the last committed reload"
    );
}

/// Close hook draining histogram buckets before the process exits.
pub fn flush_hook(handle: PrometheusHandle) -> impl FnOnce() + Send + 'static {
    move || {
        handle.run_upkeep();
        debug!("Metrics flushed");
    }
}
