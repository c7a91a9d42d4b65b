//! Tool parameterization and filtering for the current target topology.
//!
//! Every tool contributed by an enabled toolset runs through the [`MutatorChain`]
//! and then the composite [`ToolFilter`] on each reload.
//!
//! ```ignore
//! let topology = Topology::new(targets, default_target, "cluster".into());
//! let pipeline = Pipeline::new(&topology, PolicyFilter::new(true, false, None, None));
//! let exposed: Vec<ServerTool> = tools.into_iter().filter_map(|t| pipeline.apply(t)).collect();
//! ```

mod filter;
mod mutator;

pub use filter::{AllOf, PolicyFilter, TargetListFilter, ToolFilter};
pub use mutator::{MutatorChain, TargetListSpecializer, TargetParameterInjector, ToolMutator};

use crate::inventory::ServerTool;

/// Reserved tool name a toolset uses to contribute the generic "list targets" tool.
pub const TARGET_LIST_SENTINEL: &str = "targets_list";

/// Target parameter name used by kubeconfig-context providers.
pub const CONTEXT_PARAMETER: &str = "context";

/// The kubeconfig-context listing tool, exclusive with `context_list`.
pub const CONTEXTS_LIST_TOOL: &str = "configuration_contexts_list";

/// Largest target count still advertised as a schema `enum`.
pub const MAX_TARGETS_IN_ENUM: usize = 5;

/// Targets as fetched for one reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Sorted lexicographically.
    pub targets: Vec<String>,
    pub default_target: String,
    pub parameter_name: String,
}

impl Topology {
    pub fn new(mut targets: Vec<String>, default_target: String, parameter_name: String) -> Self {
        targets.sort();
        targets.dedup();
        Self {
            targets,
            default_target,
            parameter_name,
        }
    }
}

/// Mutators and filters bound to one topology.
pub struct Pipeline {
    topology: Topology,
    mutators: MutatorChain,
    filter: AllOf,
}

impl Pipeline {
    /// Standard mutators, the given policy and the target-list filter.
    pub fn new(topology: &Topology, policy: PolicyFilter) -> Self {
        Self {
            topology: topology.clone(),
            mutators: MutatorChain::standard(),
            filter: AllOf::new()
                .with(policy)
                .with(TargetListFilter::new(topology)),
        }
    }

    /// Mutate the tool, returning it only if it stays visible.
    pub fn apply(&self, tool: ServerTool) -> Option<ServerTool> {
        let tool = self.mutators.mutate(tool, &self.topology);
        self.filter.allows(&tool).then_some(tool)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

#[cfg(test)]
mod tests {
    use rmcp::model::CallToolResult;
    use serde_json::json;

    use super::*;
    use crate::{
        annotations::ToolHints,
        inventory::{tool_definition, ToolRequest},
    };

    fn sentinel() -> ServerTool {
        let def = tool_definition(
            TARGET_LIST_SENTINEL,
            "list targets",
            json!({}),
            ToolHints::new().with_read_only(true).into_rmcp("Targets: List"),
        );
        ServerTool::new(def, |_request: ToolRequest| async {
            Ok(CallToolResult::success(vec![]))
        })
        .with_cluster_aware(false)
        .with_target_list_provider(true)
    }

    #[test]
    fn test_topology_sorts_targets() {
        let topology = Topology::new(
            vec!["b".into(), "a".into(), "b".into()],
            "b".into(),
            "cluster".into(),
        );
        assert_eq!(topology.targets, vec!["a", "b"]);
    }

    #[test]
    fn test_pipeline_filters_after_mutation() {
        let multi = Topology::new(vec!["a".into(), "b".into()], "a".into(), "cluster".into());
        let pipeline = Pipeline::new(&multi, PolicyFilter::default());
        let out = pipeline.apply(sentinel()).unwrap();
        assert_eq!(out.name(), "cluster_list");

        let single = Topology::new(vec!["a".into()], "a".into(), "cluster".into());
        let pipeline = Pipeline::new(&single, PolicyFilter::default());
        assert!(pipeline.apply(sentinel()).is_none());
    }

    #[test]
    fn test_pipeline_disallowed_by_renamed_name() {
        let multi = Topology::new(vec!["a".into(), "b".into()], "a".into(), "cluster".into());
        let denied = vec!["cluster_list".to_string()];
        let pipeline = Pipeline::new(&multi, PolicyFilter::new(false, false, None, Some(&denied)));
        assert!(pipeline.apply(sentinel()).is_none());
    }
}
