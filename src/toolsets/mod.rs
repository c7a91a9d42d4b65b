//! Concrete Kubernetes toolsets.
//!
//! - `core`: namespaces, pods and events of the selected target
//! - `config`: the kubeconfig behind the targets, plus the generic target-list tool

mod config;
mod core;

use std::sync::Arc;

use kms_mcp::{McpError, McpResult, ToolRequest, ToolsetRegistry};
use kube::Client;
use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::Value;

pub use self::{config::ConfigToolset, core::CoreToolset};
use crate::{
    cluster::ClusterAccess,
    output::{self, Column},
};

/// Every toolset this binary ships, in registration order.
pub fn registry(access: Arc<dyn ClusterAccess>) -> McpResult<ToolsetRegistry> {
    ToolsetRegistry::new()
        .with(Arc::new(CoreToolset::new(access.clone())))?
        .with(Arc::new(ConfigToolset::new(access)))
}

fn text(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn kube_error(e: kube::Error) -> McpError {
    McpError::ToolExecution(e.to_string())
}

/// Client for the target the request selects.
async fn client(access: &dyn ClusterAccess, request: &ToolRequest) -> McpResult<Client> {
    let target = access.target_of(request);
    Ok(access.client_for(&target).await?)
}

fn required_str<'a>(request: &'a ToolRequest, key: &str) -> McpResult<&'a str> {
    request
        .str_arg(key)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| McpError::InvalidArguments(format!("missing argument '{key}'")))
}

/// Render `items` with the formatter configured for this call.
fn render_list<K: Serialize>(
    request: &ToolRequest,
    items: &[K],
    columns: &[Column],
) -> McpResult<CallToolResult> {
    if items.is_empty() {
        return Ok(text("No resources found"));
    }
    let values = items
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()?;
    let rendered = output::formatter(request.context.list_output).format(&values, columns)?;
    Ok(text(rendered))
}

#[cfg(test)]
pub(crate) mod tests {
    use kube::config::Kubeconfig;

    use super::*;
    use crate::{
        cluster::kubeconfig::tests::KUBECONFIG,
        error::{AppError, AppResult},
    };

    /// Access with no reachable cluster, optionally backed by a kubeconfig.
    #[derive(Default)]
    pub(crate) struct OfflineAccess {
        kubeconfig: Option<Kubeconfig>,
    }

    impl OfflineAccess {
        pub(crate) fn with_kubeconfig() -> Self {
            Self {
                kubeconfig: Some(Kubeconfig::from_yaml(KUBECONFIG).unwrap()),
            }
        }
    }

    #[async_trait::async_trait]
    impl ClusterAccess for OfflineAccess {
        async fn client_for(&self, target: &str) -> AppResult<Client> {
            Err(AppError::UnknownTarget(target.to_string()))
        }

        fn parameter_name(&self) -> String {
            "context".to_string()
        }

        fn default_target(&self) -> String {
            "dev".to_string()
        }

        fn kubeconfig(&self) -> Option<Kubeconfig> {
            self.kubeconfig.clone()
        }
    }

    #[test]
    fn test_registry_order() {
        let registry = registry(Arc::new(OfflineAccess::default())).unwrap();
        assert_eq!(registry.names(), vec!["core", "config"]);
    }

    #[test]
    fn test_required_str() {
        let mut args = rmcp::model::JsonObject::new();
        args.insert("name".to_string(), serde_json::json!(""));
        let request = ToolRequest::new("pods_get", args);
        assert!(matches!(
            required_str(&request, "name"),
            Err(McpError::InvalidArguments(_))
        ));
    }
}
