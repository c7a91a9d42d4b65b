//! Tool annotation hints.
//!
//! We keep [`ToolHints`] separate from [`rmcp::model::ToolAnnotations`] because:
//! - rmcp uses `Option<bool>` requiring unwrapping everywhere
//! - registry policy only trusts hints that were set explicitly, so an unset hint
//!   reads as `false` here (an unset read-only hint does not make a tool read-only,
//!   an unset destructive hint does not make it destructive)

use rmcp::model::{Tool, ToolAnnotations as RmcpToolAnnotations};
use serde::{Deserialize, Serialize};

use crate::error::{McpError, McpResult};

/// Tool behavior hints as seen by the filtering pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolHints {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
}

impl ToolHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read rmcp's optional hints, treating anything not explicitly `true` as `false`.
    pub fn from_rmcp(rmcp: &RmcpToolAnnotations) -> Self {
        Self {
            read_only: rmcp.read_only_hint == Some(true),
            destructive: rmcp.destructive_hint == Some(true),
            idempotent: rmcp.idempotent_hint == Some(true),
            open_world: rmcp.open_world_hint == Some(true),
        }
    }

    pub fn from_rmcp_option(rmcp: Option<&RmcpToolAnnotations>) -> Self {
        rmcp.map(Self::from_rmcp).unwrap_or_default()
    }

    pub fn of(tool: &Tool) -> Self {
        Self::from_rmcp_option(tool.annotations.as_ref())
    }

    #[must_use]
    pub fn with_read_only(mut self, v: bool) -> Self {
        self.read_only = v;
        self
    }

    #[must_use]
    pub fn with_destructive(mut self, v: bool) -> Self {
        self.destructive = v;
        self
    }

    #[must_use]
    pub fn with_idempotent(mut self, v: bool) -> Self {
        self.idempotent = v;
        self
    }

    #[must_use]
    pub fn with_open_world(mut self, v: bool) -> Self {
        self.open_world = v;
        self
    }

    /// Convert to rmcp annotations with every hint set explicitly.
    pub fn into_rmcp(self, title: impl Into<String>) -> RmcpToolAnnotations {
        RmcpToolAnnotations {
            title: Some(title.into()),
            read_only_hint: Some(self.read_only),
            destructive_hint: Some(self.destructive),
            idempotent_hint: Some(self.idempotent),
            open_world_hint: Some(self.open_world),
        }
    }
}

/// A tool must never claim to be both read-only and destructive.
pub fn validate(tool: &Tool) -> McpResult<()> {
    let hints = ToolHints::of(tool);
    if hints.read_only && hints.destructive {
        return Err(McpError::InvalidTool {
            tool_name: tool.name.to_string(),
            reason: "tool is annotated as both read-only and destructive".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{borrow::Cow, sync::Arc};

    use super::*;

    fn tool_with(annotations: Option<RmcpToolAnnotations>) -> Tool {
        Tool {
            name: Cow::Borrowed("pods_list"),
            title: None,
            description: None,
            input_schema: Arc::new(serde_json::Map::new()),
            output_schema: None,
            annotations,
            icons: None,
        }
    }

    #[test]
    fn test_from_rmcp() {
        let rmcp = RmcpToolAnnotations {
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
            title: None,
        };
        let hints = ToolHints::from_rmcp(&rmcp);
        assert!(hints.read_only);
        assert!(!hints.destructive);
        assert!(hints.idempotent);
    }

    #[test]
    fn test_unset_hints_are_not_trusted() {
        let rmcp = RmcpToolAnnotations {
            read_only_hint: None,
            destructive_hint: None,
            idempotent_hint: None,
            open_world_hint: None,
            title: None,
        };
        let hints = ToolHints::from_rmcp(&rmcp);
        assert!(!hints.read_only);
        assert!(!hints.destructive);
        assert_eq!(ToolHints::of(&tool_with(None)), ToolHints::default());
    }

    #[test]
    fn test_into_rmcp_sets_every_hint() {
        let rmcp = ToolHints::new()
            .with_read_only(true)
            .with_open_world(true)
            .into_rmcp("Pods: List");
        assert_eq!(rmcp.title.as_deref(), Some("Pods: List"));
        assert_eq!(rmcp.read_only_hint, Some(true));
        assert_eq!(rmcp.destructive_hint, Some(false));
        assert_eq!(rmcp.idempotent_hint, Some(false));
        assert_eq!(rmcp.open_world_hint, Some(true));
    }

    #[test]
    fn test_validate_rejects_read_only_destructive() {
        let ok = tool_with(Some(ToolHints::new().with_read_only(true).into_rmcp("ok")));
        assert!(validate(&ok).is_ok());

        let bad = tool_with(Some(
            ToolHints::new()
                .with_read_only(true)
                .with_destructive(true)
                .into_rmcp("bad"),
        ));
        assert!(matches!(
            validate(&bad),
            Err(McpError::InvalidTool { .. })
        ));
    }
}
