//! Visibility predicates applied after mutation.

use std::collections::HashSet;

use super::{Topology, CONTEXTS_LIST_TOOL, CONTEXT_PARAMETER};
use crate::{annotations::ToolHints, inventory::ServerTool};

/// Decides whether a mutated tool is exposed.
pub trait ToolFilter: Send + Sync {
    fn allows(&self, tool: &ServerTool) -> bool;
}

/// Security policy from configuration.
#[derive(Debug, Clone, Default)]
pub struct PolicyFilter {
    pub read_only: bool,
    pub disable_destructive: bool,
    pub enabled_tools: Option<HashSet<String>>,
    pub disabled_tools: Option<HashSet<String>>,
}

impl PolicyFilter {
    pub fn new(
        read_only: bool,
        disable_destructive: bool,
        enabled_tools: Option<&[String]>,
        disabled_tools: Option<&[String]>,
    ) -> Self {
        Self {
            read_only,
            disable_destructive,
            enabled_tools: enabled_tools.map(|names| names.iter().cloned().collect()),
            disabled_tools: disabled_tools.map(|names| names.iter().cloned().collect()),
        }
    }
}

impl ToolFilter for PolicyFilter {
    fn allows(&self, tool: &ServerTool) -> bool {
        let hints = ToolHints::of(&tool.tool);
        if self.read_only && !hints.read_only {
            return false;
        }
        if self.disable_destructive && hints.destructive {
            return false;
        }
        if let Some(allowed) = &self.enabled_tools {
            if !allowed.contains(tool.name()) {
                return false;
            }
        }
        if let Some(denied) = &self.disabled_tools {
            if denied.contains(tool.name()) {
                return false;
            }
        }
        true
    }
}

/// Hides target-list tools when there is nothing to choose between, and keeps
/// exactly one of the two target listing surfaces.
#[derive(Debug, Clone)]
pub struct TargetListFilter {
    target_count: usize,
    parameter_name: String,
}

impl TargetListFilter {
    pub fn new(topology: &Topology) -> Self {
        Self {
            target_count: topology.targets.len(),
            parameter_name: topology.parameter_name.clone(),
        }
    }
}

impl ToolFilter for TargetListFilter {
    fn allows(&self, tool: &ServerTool) -> bool {
        if !tool.target_list_provider {
            return true;
        }
        if self.target_count <= 1 {
            return false;
        }

        // A context-keyed provider lists through the kubeconfig tool; every
        // other provider lists through the specialized `{param}_list` tool.
        let generic_list = format!("{}_list", self.parameter_name);
        if self.parameter_name == CONTEXT_PARAMETER {
            tool.name() != generic_list
        } else {
            tool.name() != CONTEXTS_LIST_TOOL
        }
    }
}

/// Logical AND of every contained filter.
#[derive(Default)]
pub struct AllOf {
    filters: Vec<Box<dyn ToolFilter>>,
}

impl AllOf {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, filter: impl ToolFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl ToolFilter for AllOf {
    fn allows(&self, tool: &ServerTool) -> bool {
        self.filters.iter().all(|filter| filter.allows(tool))
    }
}

#[cfg(test)]
mod tests {
    use rmcp::model::CallToolResult;
    use serde_json::json;

    use super::*;
    use crate::inventory::{tool_definition, ToolRequest};

    fn tool(name: &str, hints: ToolHints) -> ServerTool {
        let def = tool_definition(name, "test tool", json!({}), hints.into_rmcp(name));
        ServerTool::new(def, |_request: ToolRequest| async {
            Ok(CallToolResult::success(vec![]))
        })
    }

    fn read_only(name: &str) -> ServerTool {
        tool(name, ToolHints::new().with_read_only(true))
    }

    fn topology(targets: &[&str], param: &str) -> Topology {
        Topology::new(
            targets.iter().map(|t| t.to_string()).collect(),
            targets.first().map(|t| t.to_string()).unwrap_or_default(),
            param.to_string(),
        )
    }

    #[test]
    fn test_read_only_policy() {
        let filter = PolicyFilter::new(true, false, None, None);
        assert!(filter.allows(&read_only("pods_list")));
        assert!(!filter.allows(&tool("pods_exec", ToolHints::new())));
    }

    #[test]
    fn test_disable_destructive_policy() {
        let filter = PolicyFilter::new(false, true, None, None);
        assert!(filter.allows(&tool("pods_exec", ToolHints::new())));
        assert!(!filter.allows(&tool(
            "pods_delete",
            ToolHints::new().with_destructive(true)
        )));
    }

    #[test]
    fn test_allow_and_deny_lists() {
        let allowed = vec!["pods_list".to_string(), "pods_get".to_string()];
        let denied = vec!["pods_get".to_string()];
        let filter = PolicyFilter::new(false, false, Some(&allowed), Some(&denied));

        assert!(filter.allows(&read_only("pods_list")));
        assert!(!filter.allows(&read_only("pods_get")));
        assert!(!filter.allows(&read_only("events_list")));
    }

    #[test]
    fn test_target_list_hidden_for_single_target() {
        let filter = TargetListFilter::new(&topology(&["only"], "cluster"));
        assert!(!filter.allows(&read_only("cluster_list").with_target_list_provider(true)));
        assert!(filter.allows(&read_only("pods_list")));
    }

    #[test]
    fn test_mutual_exclusion_for_context_provider() {
        let filter = TargetListFilter::new(&topology(&["a", "b"], CONTEXT_PARAMETER));
        let contexts = read_only(CONTEXTS_LIST_TOOL)
            .with_cluster_aware(false)
            .with_target_list_provider(true);
        let generic = read_only("context_list").with_target_list_provider(true);
        assert!(filter.allows(&contexts));
        assert!(!filter.allows(&generic));
    }

    #[test]
    fn test_mutual_exclusion_for_cluster_provider() {
        let filter = TargetListFilter::new(&topology(&["a", "b"], "cluster"));
        let contexts = read_only(CONTEXTS_LIST_TOOL).with_target_list_provider(true);
        let generic = read_only("cluster_list").with_target_list_provider(true);
        assert!(!filter.allows(&contexts));
        assert!(filter.allows(&generic));
    }

    #[test]
    fn test_all_of() {
        let filter = AllOf::new()
            .with(PolicyFilter::new(true, false, None, None))
            .with(TargetListFilter::new(&topology(&["a"], "cluster")));
        assert!(filter.allows(&read_only("pods_list")));
        assert!(!filter.allows(&read_only("cluster_list").with_target_list_provider(true)));
        assert!(AllOf::new().allows(&tool("anything", ToolHints::new())));
    }
}
