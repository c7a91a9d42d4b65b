use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use kms::{
    cli::Cli,
    cluster::{self, ApiSurfaceFingerprint},
    config::{config_loader, AppConfig},
    logging::{self, LoggingConfig},
    metrics, toolsets, transport,
};
use kms_mcp::McpServer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli)
        .await
        .context("failed to load configuration")?;

    let logging = logging::init(&LoggingConfig::from_app(&config))?;
    let prometheus = metrics::install()?;

    let cluster = cluster::connect(&config).context("failed to set up cluster access")?;
    let registry = Arc::new(toolsets::registry(cluster.access.clone())?);

    let server = McpServer::builder(config.server.clone(), cluster.provider.clone(), registry)
        .name(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .build()
        .await
        .context("failed to build the initial tool registry")?;
    server.on_close(metrics::flush_hook(prometheus.clone()));

    if let Some(path) = cli.config.clone() {
        if config.server.watch.watch_config {
            server.spawn_config_watcher(&path, config_loader(&path, cli.clone()))?;
        }
    }
    server.spawn_topology_poller(Arc::new(ApiSurfaceFingerprint::new(cluster.access.clone())));

    let served = match config.port {
        Some(port) => {
            let router = transport::router(server.clone(), prometheus);
            transport::serve_http(router, port, shutdown_signal()).await
        }
        None => {
            tokio::select! {
                result = transport::serve_stdio(server.clone()) => result,
                _ = shutdown_signal() => Ok(()),
            }
        }
    };
    if let Err(e) = &served {
        error!(error = %e, "Transport stopped with an error");
    }

    server.close().await;
    info!("Server closed");
    logging.shutdown();
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
