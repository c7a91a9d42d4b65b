//! stdio and streamable HTTP transports.
//!
//! # Endpoints (HTTP)
//!
//! - `/mcp` - MCP streamable HTTP
//! - `GET /healthz` - liveness plus registry size
//! - `GET /metrics` - Prometheus exposition

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use kms_mcp::McpServer;
use metrics_exporter_prometheus::PrometheusHandle;
use rmcp::{
    transport::{
        stdio,
        streamable_http_server::{
            session::local::LocalSessionManager, StreamableHttpServerConfig,
            StreamableHttpService,
        },
    },
    ServiceExt,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Serve a single client over stdin/stdout until it disconnects.
pub async fn serve_stdio(server: McpServer) -> AppResult<()> {
    info!(server = %server.name(), "Serving MCP over stdio");
    let running = server
        .serve(stdio())
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;
    running
        .waiting()
        .await
        .map_err(|e| AppError::Transport(e.to_string()))?;
    Ok(())
}

#[derive(Clone)]
struct HttpState {
    server: McpServer,
    metrics: PrometheusHandle,
}

/// Routes for the HTTP listener. Session persistence follows the server's
/// `stateless` setting at the time the router is built.
pub fn router(server: McpServer, metrics: PrometheusHandle) -> Router {
    let config = StreamableHttpServerConfig {
        stateful_mode: !server.is_stateless(),
        ..Default::default()
    };
    let factory = server.clone();
    let mcp = StreamableHttpService::new(
        move || Ok(factory.clone()),
        Arc::new(LocalSessionManager::default()),
        config,
    );

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .nest_service("/mcp", mcp)
        .layer(TraceLayer::new_for_http())
        .with_state(HttpState { server, metrics })
}

async fn healthz(State(state): State<HttpState>) -> Response {
    let status = if state.server.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = json!({
        "status": if status == StatusCode::OK { "ok" } else { "closed" },
        "tools": state.server.enabled_tools().len(),
        "prompts": state.server.enabled_prompts().len(),
        "sessions": state.server.sessions().peer_count(),
    });
    (status, Json(body)).into_response()
}

async fn render_metrics(State(state): State<HttpState>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Bind `port` on all interfaces and serve until `shutdown` resolves.
pub async fn serve_http(
    router: Router,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> AppResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Serving MCP over streamable HTTP at /mcp");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
