//! Registry error types.
//!
//! Defines error variants for target discovery, toolset enumeration, configuration,
//! authorization, and tool/prompt dispatch.

use thiserror::Error;

pub type McpResult<T> = Result<T, McpError>;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("Failed to fetch targets: {0}")]
    TargetFetch(String),

    #[error("Toolset '{toolset}' failed to list tools: {message}")]
    Toolset { toolset: String, message: String },

    #[error("Unknown toolset: {0}")]
    UnknownToolset(String),

    #[error("Tool name collision: '{tool_name}' contributed by toolsets: {toolsets:?}")]
    ToolCollision {
        tool_name: String,
        toolsets: Vec<String>,
    },

    #[error("Invalid tool definition '{tool_name}': {reason}")]
    InvalidTool { tool_name: String, reason: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Server is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Whether the error came from fetching the current target topology.
    pub fn is_target_fetch(&self) -> bool {
        matches!(self, McpError::TargetFetch(_))
    }

    pub fn toolset(toolset: impl Into<String>, message: impl ToString) -> Self {
        McpError::Toolset {
            toolset: toolset.into(),
            message: message.to_string(),
        }
    }
}

impl From<notify::Error> for McpError {
    fn from(e: notify::Error) -> Self {
        McpError::Watch(e.to_string())
    }
}
