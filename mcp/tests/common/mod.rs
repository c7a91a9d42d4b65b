//! Shared fixtures for registry integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use kms_mcp::{
    inventory::{prompt_definition, tool_definition, PromptRequest, ToolRequest},
    McpError, McpResult, ServerPrompt, ServerTool, TargetProvider, ToolHints, Toolset,
    ToolsetRegistry,
};
use parking_lot::RwLock;
use rmcp::model::{CallToolResult, Content, GetPromptResult, PromptMessage, PromptMessageRole};
use serde_json::json;

/// Declarative tool description used by [`StaticToolset`].
#[derive(Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub hints: ToolHints,
    pub cluster_aware: bool,
    pub target_list_provider: bool,
}

impl ToolSpec {
    pub fn read_only(name: &'static str) -> Self {
        Self {
            name,
            hints: ToolHints::new().with_read_only(true),
            cluster_aware: true,
            target_list_provider: false,
        }
    }

    pub fn destructive(name: &'static str) -> Self {
        Self {
            name,
            hints: ToolHints::new().with_destructive(true),
            cluster_aware: true,
            target_list_provider: false,
        }
    }

    pub fn target_list(name: &'static str) -> Self {
        Self {
            name,
            hints: ToolHints::new().with_read_only(true),
            cluster_aware: false,
            target_list_provider: true,
        }
    }

    fn build(&self) -> ServerTool {
        let name = self.name;
        let definition = tool_definition(
            name,
            format!("{name} test tool"),
            json!({"type": "object", "properties": {}}),
            self.hints.into_rmcp(name),
        );
        ServerTool::new(definition, move |request: ToolRequest| async move {
            if request.bool_arg("fail") == Some(true) {
                return Err(McpError::ToolExecution(format!("{name} failed")));
            }
            Ok(CallToolResult::success(vec![Content::text(format!(
                "{name} ok"
            ))]))
        })
        .with_cluster_aware(self.cluster_aware)
        .with_target_list_provider(self.target_list_provider)
    }
}

/// A toolset whose tools and prompts can be swapped between reloads.
pub struct StaticToolset {
    name: &'static str,
    tools: RwLock<Vec<ToolSpec>>,
    prompts: RwLock<Vec<(&'static str, &'static str)>>,
    failing: AtomicBool,
    list_calls: AtomicUsize,
}

impl StaticToolset {
    pub fn new(name: &'static str, tools: Vec<ToolSpec>) -> Arc<Self> {
        Arc::new(Self {
            name,
            tools: RwLock::new(tools),
            prompts: RwLock::new(Vec::new()),
            failing: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_tools(&self, tools: Vec<ToolSpec>) {
        *self.tools.write() = tools;
    }

    /// Prompts as `(name, description)`; each renders its description as one user message.
    pub fn set_prompts(&self, prompts: Vec<(&'static str, &'static str)>) {
        *self.prompts.write() = prompts;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolset for StaticToolset {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "integration test toolset"
    }

    async fn list_tools(&self, _provider: &dyn TargetProvider) -> McpResult<Vec<ServerTool>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(McpError::Provider("discovery unavailable".to_string()));
        }
        Ok(self.tools.read().iter().map(ToolSpec::build).collect())
    }

    fn list_prompts(&self) -> Vec<ServerPrompt> {
        self.prompts
            .read()
            .iter()
            .map(|(name, description)| {
                let text = description.to_string();
                ServerPrompt::new(
                    prompt_definition(*name, None, *description, vec![]),
                    move |_request: PromptRequest| {
                        let text = text.clone();
                        async move {
                            Ok(GetPromptResult {
                                description: None,
                                messages: vec![PromptMessage::new_text(
                                    PromptMessageRole::User,
                                    text,
                                )],
                            })
                        }
                    },
                )
            })
            .collect()
    }
}

pub fn registry(toolsets: Vec<Arc<StaticToolset>>) -> Arc<ToolsetRegistry> {
    let registry = ToolsetRegistry::new();
    for toolset in toolsets {
        registry.register(toolset).unwrap();
    }
    Arc::new(registry)
}

/// Poll `condition` until it holds or about two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
