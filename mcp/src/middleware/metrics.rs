//! Request duration and outcome recording.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;

use super::{McpRequest, McpResponse, Middleware, Next};
use crate::{core::metrics::McpMetrics, error::McpResult};

pub struct RequestMetrics {
    metrics: Arc<McpMetrics>,
}

impl RequestMetrics {
    pub fn new(metrics: Arc<McpMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl Middleware for RequestMetrics {
    fn name(&self) -> &'static str {
        "request_metrics"
    }

    async fn handle(&self, request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        let method = request.method.clone();
        let name = request.metric_name().to_string();

        self.metrics.record_call_start();
        let start = Instant::now();
        let response = next.run(request).await;
        let success = matches!(&response, Ok(r) if !r.is_error());
        self.metrics
            .record_call_end(&method, &name, success, start.elapsed());
        response
    }
}
