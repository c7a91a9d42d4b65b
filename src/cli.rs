//! Command-line flags. Every flag overrides the configuration file.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, ClusterProviderKind};

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "kubernetes-mcp-server", version, about)]
pub struct Cli {
    /// YAML configuration file, watched for changes
    #[arg(long, env = "KMS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serve streamable HTTP on this port instead of stdio
    #[arg(long, env = "KMS_PORT")]
    pub port: Option<u16>,

    /// Expose only read-only tools
    #[arg(long)]
    pub read_only: bool,

    /// Hide destructive tools
    #[arg(long)]
    pub disable_destructive: bool,

    /// Toolsets to enable
    #[arg(long, value_delimiter = ',')]
    pub toolsets: Option<Vec<String>>,

    /// Allow-list of tool names
    #[arg(long, value_delimiter = ',')]
    pub enabled_tools: Option<Vec<String>>,

    /// Deny-list of tool names
    #[arg(long, value_delimiter = ',')]
    pub disabled_tools: Option<Vec<String>>,

    /// Do not keep sessions or send list-changed notifications
    #[arg(long)]
    pub stateless: bool,

    /// Path to the kubeconfig file
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub cluster_provider: Option<ClusterProviderKind>,

    /// Log level or `EnvFilter` directive
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Overlay explicitly given flags onto `config`. Boolean flags only ever switch on.
    pub fn apply(&self, config: &mut AppConfig) {
        let server = &mut config.server;
        server.read_only |= self.read_only;
        server.disable_destructive |= self.disable_destructive;
        server.stateless |= self.stateless;
        if let Some(toolsets) = &self.toolsets {
            server.toolsets = toolsets.clone();
        }
        if let Some(tools) = &self.enabled_tools {
            server.enabled_tools = Some(tools.clone());
        }
        if let Some(tools) = &self.disabled_tools {
            server.disabled_tools = Some(tools.clone());
        }

        if self.port.is_some() {
            config.port = self.port;
        }
        if let Some(path) = &self.kubeconfig {
            config.kubeconfig = Some(path.clone());
        }
        if let Some(kind) = self.cluster_provider {
            config.cluster_provider = kind;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        config.log_json |= self.log_json;
    }
}
