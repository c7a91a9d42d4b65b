//! Error types for the server binary and its Kubernetes collaborators.

use kms_mcp::McpError;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("In-cluster configuration error: {0}")]
    InCluster(#[from] kube::config::InClusterError),

    #[error("Unknown target '{0}'")]
    UnknownTarget(String),

    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Mcp(#[from] McpError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Watch(#[from] notify::Error),
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Mcp(inner) => inner,
            AppError::Config(msg) => McpError::Config(msg),
            AppError::UnknownTarget(target) => {
                McpError::InvalidArguments(format!("unknown target '{target}'"))
            }
            AppError::Io(e) => McpError::Io(e),
            AppError::Yaml(e) => McpError::Yaml(e),
            other => McpError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_mcp_error() {
        let err: McpError = AppError::UnknownTarget("staging".to_string()).into();
        assert!(matches!(err, McpError::InvalidArguments(ref msg) if msg.contains("staging")));

        let err: McpError = AppError::Telemetry("no collector".to_string()).into();
        assert!(matches!(err, McpError::Provider(_)));

        let err: McpError = AppError::Mcp(McpError::Closed).into();
        assert!(matches!(err, McpError::Closed));
    }
}
