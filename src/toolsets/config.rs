//! Kubeconfig inspection and the generic target-list tool.

use std::{fmt::Write as _, sync::Arc};

use async_trait::async_trait;
use kms_mcp::{
    inventory::tool_definition, transform::TARGET_LIST_SENTINEL, McpError, McpResult,
    ServerTool, TargetProvider, ToolHints, ToolRequest, Toolset,
};
use serde_json::{json, Value};

use super::text;
use crate::cluster::{kubeconfig::redacted_view, ClusterAccess};

pub struct ConfigToolset {
    access: Arc<dyn ClusterAccess>,
}

impl ConfigToolset {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }

    fn contexts_list(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "configuration_contexts_list",
            "List all available context names and associated server urls from the kubeconfig file",
            json!({"type": "object", "properties": {}}),
            ToolHints::new()
                .with_read_only(true)
                .with_idempotent(true)
                .into_rmcp("Configuration: Contexts List"),
        );
        ServerTool::new(definition, move |_request: ToolRequest| {
            let access = access.clone();
            async move {
                let kubeconfig = access.kubeconfig().ok_or_else(no_kubeconfig)?;
                let view = redacted_view(&kubeconfig, false)?;
                Ok::<_, McpError>(text(render_contexts(&view, &access.default_target())))
            }
        })
        .with_cluster_aware(false)
        .with_target_list_provider(true)
    }

    fn view(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "configuration_view",
            "Get the current Kubernetes configuration content as a kubeconfig YAML",
            json!({
                "type": "object",
                "properties": {
                    "minified": {
                        "type": "boolean",
                        "description": "Return a minified version of the configuration. \
                            If set to true, keeps only the current-context and the relevant pieces of the configuration for that context. \
                            If set to false, all contexts, clusters, auth-infos, and users are returned in the configuration. \
                            (Optional, default true)"
                    }
                }
            }),
            ToolHints::new()
                .with_read_only(true)
                .with_idempotent(true)
                .into_rmcp("Configuration: View"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let minified = request.bool_arg("minified").unwrap_or(true);
                let kubeconfig = access.kubeconfig().ok_or_else(no_kubeconfig)?;
                let view = redacted_view(&kubeconfig, minified)?;
                Ok::<_, McpError>(text(serde_yaml::to_string(&view)?))
            }
        })
        .with_cluster_aware(false)
    }

    /// Renamed and given a handler by the pipeline once more than one target exists.
    fn targets_list(&self) -> ServerTool {
        let definition = tool_definition(
            TARGET_LIST_SENTINEL,
            "List the available targets",
            json!({"type": "object", "properties": {}}),
            ToolHints::new()
                .with_read_only(true)
                .with_idempotent(true)
                .into_rmcp("Targets: List"),
        );
        ServerTool::new(definition, |_request: ToolRequest| async {
            Err(McpError::ToolExecution(
                "target listing is only available with more than one target".to_string(),
            ))
        })
        .with_cluster_aware(false)
        .with_target_list_provider(true)
    }
}

fn no_kubeconfig() -> McpError {
    McpError::ToolExecution("no kubeconfig is available for this server".to_string())
}

fn render_contexts(view: &Value, default_target: &str) -> String {
    let contexts = view["contexts"].as_array().cloned().unwrap_or_default();
    if contexts.is_empty() {
        return "No contexts found in kubeconfig".to_string();
    }
    let clusters = view["clusters"].as_array().cloned().unwrap_or_default();
    let server_of = |cluster: &str| {
        clusters
            .iter()
            .find(|c| c["name"].as_str() == Some(cluster))
            .and_then(|c| c["cluster"]["server"].as_str())
            .unwrap_or("unknown")
            .to_string()
    };

    let mut out = format!(
        "Available Kubernetes contexts ({} total, default: {default_target}):\n\n\
         Format: [*] CONTEXT_NAME -> SERVER_URL\n\n",
        contexts.len()
    );
    for context in &contexts {
        let name = context["name"].as_str().unwrap_or_default();
        let cluster = context["context"]["cluster"].as_str().unwrap_or_default();
        let marker = if name == default_target { "*" } else { " " };
        let _ = writeln!(out, "{marker} {name} -> {}", server_of(cluster));
    }
    out
}

#[async_trait]
impl Toolset for ConfigToolset {
    fn name(&self) -> &str {
        "config"
    }

    fn description(&self) -> &str {
        "View and manage the current local Kubernetes configuration (kubeconfig)"
    }

    async fn list_tools(&self, _provider: &dyn TargetProvider) -> McpResult<Vec<ServerTool>> {
        Ok(vec![self.contexts_list(), self.targets_list(), self.view()])
    }
}

#[cfg(test)]
mod tests {
    use kms_mcp::{
        transform::{Pipeline, PolicyFilter, Topology},
        MockTargetProvider,
    };
    use rmcp::model::{JsonObject, RawContent};

    use super::*;
    use crate::toolsets::tests::OfflineAccess;

    fn result_text(result: &rmcp::model::CallToolResult) -> String {
        match &result.content[0].raw {
            RawContent::Text(text) => text.text.clone(),
            other => panic!("unexpected content {other:?}"),
        }
    }

    async fn tools(access: OfflineAccess) -> Vec<ServerTool> {
        ConfigToolset::new(Arc::new(access))
            .list_tools(&MockTargetProvider::new(&["dev"], "dev"))
            .await
            .unwrap()
    }

    fn find<'a>(tools: &'a [ServerTool], name: &str) -> &'a ServerTool {
        tools.iter().find(|t| t.name() == name).unwrap()
    }

    #[tokio::test]
    async fn test_contexts_list_marks_default() {
        let tools = tools(OfflineAccess::with_kubeconfig()).await;
        let result = find(&tools, "configuration_contexts_list")
            .handler
            .call(ToolRequest::new("configuration_contexts_list", JsonObject::new()))
            .await
            .unwrap();
        let text = result_text(&result);
        assert!(text.contains("2 total, default: dev"));
        assert!(text.contains("* dev -> https://dev.example.com"));
        assert!(text.contains("  prod -> https://prod.example.com"));
    }

    #[tokio::test]
    async fn test_view_is_minified_by_default() {
        let tools = tools(OfflineAccess::with_kubeconfig()).await;
        let view = find(&tools, "configuration_view");

        let minified = view
            .handler
            .call(ToolRequest::new("configuration_view", JsonObject::new()))
            .await
            .unwrap();
        let text = result_text(&minified);
        assert!(text.contains("dev-cluster"));
        assert!(!text.contains("prod-cluster"));
        assert!(!text.contains("dev-secret"));

        let mut args = JsonObject::new();
        args.insert("minified".to_string(), json!(false));
        let full = view
            .handler
            .call(ToolRequest::new("configuration_view", args))
            .await
            .unwrap();
        assert!(result_text(&full).contains("prod-cluster"));
    }

    #[tokio::test]
    async fn test_tools_without_kubeconfig_fail() {
        let tools = tools(OfflineAccess::default()).await;
        let err = find(&tools, "configuration_view")
            .handler
            .call(ToolRequest::new("configuration_view", JsonObject::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no kubeconfig"));
    }

    #[tokio::test]
    async fn test_context_parameter_keeps_contexts_list_only() {
        let tools = tools(OfflineAccess::with_kubeconfig()).await;
        let topology = Topology::new(
            vec!["dev".to_string(), "prod".to_string()],
            "dev".to_string(),
            "context".to_string(),
        );
        let pipeline = Pipeline::new(&topology, PolicyFilter::default());
        let mut exposed: Vec<String> = tools
            .into_iter()
            .filter_map(|tool| pipeline.apply(tool))
            .map(|tool| tool.name().to_string())
            .collect();
        exposed.sort();
        assert_eq!(exposed, vec!["configuration_contexts_list", "configuration_view"]);
    }

    #[tokio::test]
    async fn test_cluster_parameter_specializes_sentinel() {
        let tools = tools(OfflineAccess::default()).await;
        let topology = Topology::new(
            vec!["east".to_string(), "west".to_string()],
            "east".to_string(),
            "cluster".to_string(),
        );
        let pipeline = Pipeline::new(&topology, PolicyFilter::default());
        let exposed: Vec<String> = tools
            .into_iter()
            .filter_map(|tool| pipeline.apply(tool))
            .map(|tool| tool.name().to_string())
            .collect();
        assert!(exposed.contains(&"cluster_list".to_string()));
        assert!(!exposed.contains(&"configuration_contexts_list".to_string()));
    }
}
