//! Model Context Protocol (MCP) server registry.
//!
//! ## Modules
//!
//! - [`core`]: server, configuration, reload controller and session layer
//! - [`inventory`]: toolsets and the tools/prompts they contribute
//! - [`provider`]: target provider contract
//! - [`transform`]: per-topology tool mutation and filtering
//! - [`middleware`]: interceptors around tool calls and prompt requests
//! - [`watch`]: configuration and capability change watchers
//!
//! ## Shared Types
//!
//! - [`ToolHints`]: tool behavior hints (read_only, destructive, etc.)

// Shared types (used across modules)
pub mod annotations;
pub mod error;
pub mod prompts;
pub mod transform;

// Subsystems
pub mod core;
pub mod inventory;
pub mod middleware;
pub mod provider;
pub mod watch;

// Re-export from core
pub use core::{
    config, Configuration, ListChanged, ListOutput, McpMetrics, McpServer, McpServerBuilder,
    MetricsSnapshot, PromptDefinition, ReloadController, ReloadReport, ServerConfig,
    SessionRegistry,
};

// Re-export shared types
pub use annotations::ToolHints;
pub use error::{McpError, McpResult};
// Re-export from inventory
pub use inventory::{
    PromptRequest, ServerPrompt, ServerTool, Toolset, ToolsetRegistry, ToolRequest,
};
pub use middleware::{CallContext, McpRequest};
pub use provider::{MockTargetProvider, TargetProvider, TargetWatch, VerifiedToken};
// Re-export from transform
pub use transform::{Pipeline, Topology};
pub use watch::{CapabilitySource, ConfigLoader};
