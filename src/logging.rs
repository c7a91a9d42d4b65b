//! Tracing subscriber and OpenTelemetry setup.
//!
//! Logs always go to stderr so the stdio transport owns stdout. `RUST_LOG`
//! overrides the configured level.

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{propagation::TraceContextPropagator, runtime, trace::TracerProvider, Resource};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub service_name: String,
    pub level: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl LoggingConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            service_name: env!("CARGO_PKG_NAME").to_string(),
            level: config.log_level.clone(),
            json: config.log_json,
            otlp_endpoint: config.otlp_endpoint.clone(),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Keeps the trace exporter alive; call [`LoggingGuard::shutdown`] before exit.
pub struct LoggingGuard {
    tracer_provider: Option<TracerProvider>,
}

impl LoggingGuard {
    /// Flush pending spans and stop the exporter.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                warn!(error = %e, "Trace exporter shutdown failed");
            }
        }
    }
}

fn tracer_provider(service_name: &str, endpoint: &str) -> AppResult<TracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build())
}

/// Install the global subscriber and the W3C trace-context propagator.
///
/// Must run inside a tokio runtime when an OTLP endpoint is configured.
pub fn init(config: &LoggingConfig) -> AppResult<LoggingGuard> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let fmt_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let tracer_provider = config
        .otlp_endpoint
        .as_deref()
        .map(|endpoint| tracer_provider(&config.service_name, endpoint))
        .transpose()?;
    let otel_layer = tracer_provider.as_ref().map(|provider| {
        global::set_tracer_provider(provider.clone());
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    info!(
        service = %config.service_name,
        level = %config.level,
        json = config.json,
        otlp = config.otlp_endpoint.as_deref().unwrap_or("disabled"),
        "Logging initialized"
    );

    Ok(LoggingGuard { tracer_provider })
}
