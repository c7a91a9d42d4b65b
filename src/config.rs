//! Process configuration: the registry's [`ServerConfig`] plus the settings only
//! the binary cares about (listener, logging, cluster access).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::ValueEnum;
use futures::FutureExt;
use kms_mcp::{watch::ConfigLoader, McpError, ServerConfig};
use serde::{Deserialize, Serialize};

use crate::{
    cli::Cli,
    error::{AppError, AppResult},
};

/// How targets are discovered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterProviderKind {
    /// Every kubeconfig context is a target
    #[default]
    Kubeconfig,
    /// The service account of the pod this server runs in
    InCluster,
    /// Only the kubeconfig's current context
    Disabled,
}

impl ClusterProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kubeconfig => "kubeconfig",
            Self::InCluster => "in-cluster",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub server: ServerConfig,

    /// Serve streamable HTTP on this port; stdio when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_json: bool,

    /// OTLP gRPC endpoint for trace export, e.g. `http://localhost:4317`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default)]
    pub cluster_provider: ClusterProviderKind,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            port: None,
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
            kubeconfig: None,
            cluster_provider: ClusterProviderKind::default(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> AppResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AppError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// File (if any), then environment overrides, then CLI flags.
    pub async fn load(cli: &Cli) -> AppResult<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::from_file(path).await?,
            None => Self::default(),
        };
        config.server = config.server.with_env_overrides();
        cli.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        self.server.validate()?;
        if self.port == Some(0) {
            return Err(AppError::Config("port must not be 0".to_string()));
        }
        if self.cluster_provider == ClusterProviderKind::InCluster && self.kubeconfig.is_some() {
            return Err(AppError::Config(
                "kubeconfig cannot be combined with the in-cluster provider".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loader used by the configuration watcher: re-reads `path` and re-applies the
/// same CLI flags the process was started with.
pub fn config_loader(path: impl Into<PathBuf>, cli: Cli) -> ConfigLoader {
    let path = path.into();
    let cli = Arc::new(cli);
    Arc::new(move || {
        let path = path.clone();
        let cli = cli.clone();
        async move {
            let mut config = AppConfig::from_file(&path).await.map_err(McpError::from)?;
            config.server = config.server.with_env_overrides();
            cli.apply(&mut config);
            Ok::<_, McpError>(config.server)
        }
        .boxed()
    })
}
