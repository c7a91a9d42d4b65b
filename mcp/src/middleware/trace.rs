//! Distributed trace context and per-call spans.

use async_trait::async_trait;
use opentelemetry::{
    global,
    propagation::Extractor,
    trace::TraceContextExt,
};
use rmcp::model::JsonObject;
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::{McpRequest, McpResponse, Middleware, Next};
use crate::error::McpResult;

/// Read-only text-map view over request `_meta`. Non-string values are invisible.
pub struct MetaCarrier<'a>(pub &'a JsonObject);

impl Extractor for MetaCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, value)| value.is_string())
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

/// Extracts the caller's trace context with the globally installed propagator.
///
/// Missing or malformed metadata leaves the call without a remote parent.
pub struct TraceContextExtraction;

#[async_trait]
impl Middleware for TraceContextExtraction {
    fn name(&self) -> &'static str {
        "trace_context"
    }

    async fn handle(&self, mut request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        let cx = global::get_text_map_propagator(|propagator| {
            propagator.extract(&MetaCarrier(&request.meta))
        });
        if cx.span().span_context().is_valid() {
            request.context.trace_context = Some(cx);
        }
        next.run(request).await
    }
}

/// Wraps the rest of the chain in an `mcp.request` span.
pub struct TracingSpan;

#[async_trait]
impl Middleware for TracingSpan {
    fn name(&self) -> &'static str {
        "tracing_span"
    }

    async fn handle(&self, request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        let span = info_span!(
            "mcp.request",
            method = %request.method,
            name = %request.name,
            session_id = request.context.session_id.as_deref().unwrap_or(""),
        );
        if let Some(cx) = request.context.trace_context.clone() {
            span.set_parent(cx);
        }
        next.run(request).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use serde_json::json;

    use super::*;

    fn meta(value: serde_json::Value) -> JsonObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_carrier_reads_only_strings() {
        let meta = meta(json!({
            "traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "progressToken": 7,
            "tracestate": {"nested": true},
        }));
        let carrier = MetaCarrier(&meta);
        assert!(carrier.get("traceparent").is_some());
        assert!(carrier.get("progressToken").is_none());
        assert!(carrier.get("tracestate").is_none());
        assert_eq!(carrier.keys(), vec!["traceparent"]);
    }

    #[test]
    fn test_extract_valid_parent() {
        let meta = meta(json!({
            "traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        }));
        let cx = TraceContextPropagator::new().extract(&MetaCarrier(&meta));
        let span_context = cx.span().span_context().clone();
        assert!(span_context.is_valid());
        assert_eq!(
            span_context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
    }

    #[test]
    fn test_malformed_traceparent_is_ignored() {
        let meta = meta(json!({"traceparent": "not-a-trace"}));
        let cx = TraceContextPropagator::new().extract(&MetaCarrier(&meta));
        assert!(!cx.span().span_context().is_valid());
    }
}
