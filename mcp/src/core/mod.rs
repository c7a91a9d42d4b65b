//! Core MCP server infrastructure.

pub mod config;
pub mod handler;
pub mod metrics;
pub mod reload;
pub mod server;
pub mod session;

pub use config::{
    Configuration, ListOutput, PromptArgumentDefinition, PromptDefinition,
    PromptMessageDefinition, PromptRole, ServerConfig, WatchConfig,
};
pub use metrics::{LatencySnapshot, McpMetrics, MetricsSnapshot, ReloadOutcome};
pub use reload::{RegistrySnapshot, ReloadController, ReloadPhase, ReloadReport};
pub use server::{CloseHook, McpServer, McpServerBuilder};
pub use session::{ListChanged, PeerId, SessionRegistry};
