//! Tool and prompt inventory.
//!
//! - [`types`]: tool/prompt definitions paired with their handlers
//! - [`toolset`]: pluggable toolsets and the ordered registry holding them

pub mod toolset;
pub mod types;

pub use toolset::{Toolset, ToolsetRegistry};
pub use types::{
    prompt_argument, prompt_definition, tool_definition, PromptHandler, PromptRequest,
    ServerPrompt, ServerTool, ToolHandler, ToolRequest,
};
