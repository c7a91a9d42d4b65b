//! Core types for the tool and prompt inventory.

use std::{borrow::Cow, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use rmcp::model::{
    CallToolResult, GetPromptResult, JsonObject, Prompt, PromptArgument, Tool,
    ToolAnnotations as RmcpToolAnnotations,
};
use serde_json::Value;

use crate::{error::McpResult, middleware::CallContext};

/// Inputs handed to a tool handler for a single call.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: JsonObject,
    pub context: CallContext,
}

impl ToolRequest {
    pub fn new(name: impl Into<String>, arguments: JsonObject) -> Self {
        Self {
            name: name.into(),
            arguments,
            context: CallContext::default(),
        }
    }

    /// String argument, `None` when absent or not a string.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }

    pub fn bool_arg(&self, key: &str) -> Option<bool> {
        self.arguments.get(key).and_then(Value::as_bool)
    }
}

/// Inputs handed to a prompt handler for a single `prompts/get`.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub name: String,
    pub arguments: JsonObject,
    pub context: CallContext,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, request: ToolRequest) -> McpResult<CallToolResult>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolRequest) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
{
    async fn call(&self, request: ToolRequest) -> McpResult<CallToolResult> {
        self(request).await
    }
}

#[async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, request: PromptRequest) -> McpResult<GetPromptResult>;
}

#[async_trait]
impl<F, Fut> PromptHandler for F
where
    F: Fn(PromptRequest) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
{
    async fn get(&self, request: PromptRequest) -> McpResult<GetPromptResult> {
        self(request).await
    }
}

/// A tool as contributed by a toolset, before and after the parameterization pipeline.
#[derive(Clone)]
pub struct ServerTool {
    pub tool: Tool,
    /// Receives a target-selection parameter when more than one target exists.
    pub cluster_aware: bool,
    /// Lists targets; only exposed when there is more than one target to list.
    pub target_list_provider: bool,
    pub handler: Arc<dyn ToolHandler>,
}

impl ServerTool {
    /// Cluster-aware by default, not a target-list provider.
    pub fn new(tool: Tool, handler: impl ToolHandler + 'static) -> Self {
        Self {
            tool,
            cluster_aware: true,
            target_list_provider: false,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.tool.name
    }

    #[must_use]
    pub fn with_cluster_aware(mut self, v: bool) -> Self {
        self.cluster_aware = v;
        self
    }

    #[must_use]
    pub fn with_target_list_provider(mut self, v: bool) -> Self {
        self.target_list_provider = v;
        self
    }

    #[must_use]
    pub fn with_handler(mut self, handler: impl ToolHandler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }
}

impl fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTool")
            .field("name", &self.tool.name)
            .field("cluster_aware", &self.cluster_aware)
            .field("target_list_provider", &self.target_list_provider)
            .finish()
    }
}

/// A prompt template with the handler that renders it.
#[derive(Clone)]
pub struct ServerPrompt {
    pub prompt: Prompt,
    pub handler: Arc<dyn PromptHandler>,
}

impl ServerPrompt {
    pub fn new(prompt: Prompt, handler: impl PromptHandler + 'static) -> Self {
        Self {
            prompt,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.prompt.name
    }
}

impl fmt::Debug for ServerPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerPrompt")
            .field("name", &self.prompt.name)
            .field("description", &self.prompt.description)
            .finish()
    }
}

/// Build an rmcp tool definition from a JSON schema literal.
///
/// A schema that is not a JSON object is replaced by an empty object schema.
pub fn tool_definition(
    name: impl Into<String>,
    description: impl Into<String>,
    input_schema: Value,
    annotations: RmcpToolAnnotations,
) -> Tool {
    let schema = match input_schema {
        Value::Object(map) => map,
        _ => {
            let mut map = JsonObject::new();
            map.insert("type".to_string(), Value::String("object".to_string()));
            map
        }
    };

    Tool {
        name: Cow::Owned(name.into()),
        title: None,
        description: Some(Cow::Owned(description.into())),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(annotations),
        icons: None,
    }
}

/// Build an rmcp prompt definition.
pub fn prompt_definition(
    name: impl Into<String>,
    title: Option<String>,
    description: impl Into<String>,
    arguments: Vec<PromptArgument>,
) -> Prompt {
    Prompt {
        name: name.into(),
        title,
        description: Some(description.into()),
        arguments: if arguments.is_empty() {
            None
        } else {
            Some(arguments)
        },
        icons: None,
    }
}

pub fn prompt_argument(
    name: impl Into<String>,
    description: impl Into<String>,
    required: bool,
) -> PromptArgument {
    PromptArgument {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        required: Some(required),
    }
}
