//! Namespaces, pods and events.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Namespace, Pod};
use kms_mcp::{
    inventory::{prompt_argument, prompt_definition, tool_definition},
    McpError, McpResult, PromptRequest, ServerPrompt, ServerTool, TargetProvider, ToolHints, ToolRequest,
    Toolset,
};
use kube::api::{Api, DeleteParams, ListParams};
use rmcp::model::{GetPromptResult, PromptMessage, PromptMessageRole};
use serde_json::json;
use tracing::info;

use super::{client, kube_error, render_list, required_str, text};
use crate::{
    cluster::ClusterAccess,
    output::{strip_managed_fields, Column},
};

const NAMESPACE_COLUMNS: &[Column] = &[
    Column::new("NAME", "/metadata/name"),
    Column::new("STATUS", "/status/phase"),
    Column::new("CREATED", "/metadata/creationTimestamp"),
];

const POD_COLUMNS: &[Column] = &[
    Column::new("NAMESPACE", "/metadata/namespace"),
    Column::new("NAME", "/metadata/name"),
    Column::new("PHASE", "/status/phase"),
    Column::new("NODE", "/spec/nodeName"),
    Column::new("IP", "/status/podIP"),
];

const EVENT_COLUMNS: &[Column] = &[
    Column::new("NAMESPACE", "/metadata/namespace"),
    Column::new("TYPE", "/type"),
    Column::new("REASON", "/reason"),
    Column::new("OBJECT", "/involvedObject/name"),
    Column::new("MESSAGE", "/message"),
];

const HEALTH_CHECK_PROMPT: &str = "cluster-health-check";

pub struct CoreToolset {
    access: Arc<dyn ClusterAccess>,
}

impl CoreToolset {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }

    fn namespaces_list(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "namespaces_list",
            "List all the Kubernetes namespaces in the current cluster",
            json!({"type": "object", "properties": {}}),
            read_only().into_rmcp("Namespaces: List"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let client = client(access.as_ref(), &request).await?;
                let namespaces = Api::<Namespace>::all(client)
                    .list(&ListParams::default())
                    .await
                    .map_err(kube_error)?;
                render_list(&request, &namespaces.items, NAMESPACE_COLUMNS)
            }
        })
    }

    fn pods_list(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "pods_list",
            "List Kubernetes pods in all namespaces, or in the provided namespace",
            json!({
                "type": "object",
                "properties": {
                    "namespace": {
                        "type": "string",
                        "description": "Namespace to list pods from, all namespaces if not set"
                    },
                    "labelSelector": {
                        "type": "string",
                        "description": "Kubernetes label selector (e.g. 'app=myapp,env=prod')",
                        "pattern": "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]"
                    }
                }
            }),
            read_only().into_rmcp("Pods: List"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let client = client(access.as_ref(), &request).await?;
                let mut params = ListParams::default();
                if let Some(selector) = request.str_arg("labelSelector").filter(|s| !s.is_empty()) {
                    params = params.labels(selector);
                }
                let api: Api<Pod> = match request.str_arg("namespace").filter(|s| !s.is_empty()) {
                    Some(namespace) => Api::namespaced(client, namespace),
                    None => Api::all(client),
                };
                let pods = api.list(&params).await.map_err(kube_error)?;
                render_list(&request, &pods.items, POD_COLUMNS)
            }
        })
    }

    fn pods_get(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "pods_get",
            "Get a Kubernetes pod in the provided namespace with the provided name",
            json!({
                "type": "object",
                "properties": {
                    "namespace": {
                        "type": "string",
                        "description": "Namespace to get the pod from, defaults to 'default'"
                    },
                    "name": {"type": "string", "description": "Name of the pod"}
                },
                "required": ["name"]
            }),
            read_only().into_rmcp("Pods: Get"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let name = required_str(&request, "name")?;
                let namespace = namespace_or_default(&request);
                let client = client(access.as_ref(), &request).await?;
                let pod = Api::<Pod>::namespaced(client, namespace)
                    .get(name)
                    .await
                    .map_err(kube_error)?;
                let pod = strip_managed_fields(serde_json::to_value(pod)?);
                Ok::<_, McpError>(text(serde_yaml::to_string(&pod)?))
            }
        })
    }

    fn pods_delete(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "pods_delete",
            "Delete a Kubernetes pod in the provided namespace with the provided name",
            json!({
                "type": "object",
                "properties": {
                    "namespace": {
                        "type": "string",
                        "description": "Namespace to delete the pod from, defaults to 'default'"
                    },
                    "name": {"type": "string", "description": "Name of the pod to delete"}
                },
                "required": ["name"]
            }),
            ToolHints::new()
                .with_destructive(true)
                .with_idempotent(true)
                .into_rmcp("Pods: Delete"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let name = required_str(&request, "name")?;
                let namespace = namespace_or_default(&request);
                let client = client(access.as_ref(), &request).await?;
                Api::<Pod>::namespaced(client, namespace)
                    .delete(name, &DeleteParams::default())
                    .await
                    .map_err(kube_error)?;
                info!(namespace, pod = name, "Pod deleted");
                Ok::<_, McpError>(text(format!("Pod {namespace}/{name} deleted")))
            }
        })
    }

    fn events_list(&self) -> ServerTool {
        let access = self.access.clone();
        let definition = tool_definition(
            "events_list",
            "List Kubernetes events (warnings, errors, state changes) for debugging and troubleshooting",
            json!({
                "type": "object",
                "properties": {
                    "namespace": {
                        "type": "string",
                        "description": "Namespace to list events from, all namespaces if not set"
                    }
                }
            }),
            read_only().into_rmcp("Events: List"),
        );
        ServerTool::new(definition, move |request: ToolRequest| {
            let access = access.clone();
            async move {
                let client = client(access.as_ref(), &request).await?;
                let api: Api<Event> = match request.str_arg("namespace").filter(|s| !s.is_empty()) {
                    Some(namespace) => Api::namespaced(client, namespace),
                    None => Api::all(client),
                };
                let events = api.list(&ListParams::default()).await.map_err(kube_error)?;
                render_list(&request, &events.items, EVENT_COLUMNS)
            }
        })
    }
}

fn read_only() -> ToolHints {
    ToolHints::new().with_read_only(true).with_idempotent(true)
}

fn namespace_or_default(request: &ToolRequest) -> &str {
    request
        .str_arg("namespace")
        .filter(|s| !s.is_empty())
        .unwrap_or("default")
}

fn health_check_prompt() -> ServerPrompt {
    let prompt = prompt_definition(
        HEALTH_CHECK_PROMPT,
        Some("Cluster Health Check".to_string()),
        "Guide a step-by-step health assessment of the cluster",
        vec![
            prompt_argument("namespace", "Limit the check to this namespace", false),
            prompt_argument(
                "check_events",
                "Include recent warning events (true or false, default true)",
                false,
            ),
        ],
    );
    ServerPrompt::new(prompt, |request: PromptRequest| {
        let result = render_health_check(&request);
        async move { Ok::<_, McpError>(result) }
    })
}

fn prompt_arg<'a>(request: &'a PromptRequest, key: &str) -> Option<&'a str> {
    request
        .arguments
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn render_health_check(request: &PromptRequest) -> GetPromptResult {
    let arg = |key| prompt_arg(request, key);
    let scope = match arg("namespace") {
        Some(namespace) => format!("the '{namespace}' namespace"),
        None => "all namespaces".to_string(),
    };
    let check_events = arg("check_events") != Some("false");

    let mut steps = vec![
        "List the namespaces with `namespaces_list` and note any that are not Active.".to_string(),
        format!("List the pods in {scope} with `pods_list` and flag pods that are not Running or Succeeded."),
        "For each flagged pod, inspect it with `pods_get` and summarize container states and restart counts.".to_string(),
    ];
    if check_events {
        steps.push(format!(
            "List the events in {scope} with `events_list` and group Warning events by reason."
        ));
    }
    steps.push("Finish with a short report: overall status, problems found, and suggested next actions.".to_string());

    let body = steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    GetPromptResult {
        description: Some(format!("Health check of {scope}")),
        messages: vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Perform a health check of the Kubernetes cluster covering {scope}.\n\n{body}"),
        )],
    }
}

#[async_trait]
impl Toolset for CoreToolset {
    fn name(&self) -> &str {
        "core"
    }

    fn description(&self) -> &str {
        "Most common tools for Kubernetes management (pods, namespaces, events)"
    }

    async fn list_tools(&self, _provider: &dyn TargetProvider) -> McpResult<Vec<ServerTool>> {
        Ok(vec![
            self.events_list(),
            self.namespaces_list(),
            self.pods_list(),
            self.pods_get(),
            self.pods_delete(),
        ])
    }

    fn list_prompts(&self) -> Vec<ServerPrompt> {
        vec![health_check_prompt()]
    }
}
