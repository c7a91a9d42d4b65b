//! Topology-driven tool rewrites applied before filtering.

use std::{borrow::Cow, fmt::Write as _, sync::Arc};

use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::{json, Value};

use super::{Topology, MAX_TARGETS_IN_ENUM, TARGET_LIST_SENTINEL};
use crate::inventory::{ServerTool, ToolRequest};

/// Rewrites a tool's schema or metadata for the current topology.
pub trait ToolMutator: Send + Sync {
    fn mutate(&self, tool: ServerTool, topology: &Topology) -> ServerTool;
}

/// Adds the target-selection property to cluster-aware tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetParameterInjector;

impl ToolMutator for TargetParameterInjector {
    fn mutate(&self, mut tool: ServerTool, topology: &Topology) -> ServerTool {
        if !tool.cluster_aware {
            return tool;
        }

        let schema = Arc::make_mut(&mut tool.tool.input_schema);
        schema
            .entry("type")
            .or_insert_with(|| Value::String("object".to_string()));
        let properties = schema
            .entry("properties")
            .or_insert_with(|| Value::Object(JsonObject::new()));
        if !properties.is_object() {
            *properties = Value::Object(JsonObject::new());
        }

        if topology.targets.len() <= 1 {
            return tool;
        }

        let mut property = JsonObject::new();
        property.insert("type".to_string(), json!("string"));
        property.insert(
            "description".to_string(),
            Value::String(format!(
                "Optional parameter selecting which {} to interact with. Defaults to {} if not set",
                topology.parameter_name, topology.default_target
            )),
        );
        if topology.targets.len() <= MAX_TARGETS_IN_ENUM {
            property.insert("enum".to_string(), json!(topology.targets));
        }

        if let Some(properties) = properties.as_object_mut() {
            properties.insert(topology.parameter_name.clone(), Value::Object(property));
        }
        tool
    }
}

/// Turns the reserved target-list sentinel into `{parameter}_list`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TargetListSpecializer;

impl ToolMutator for TargetListSpecializer {
    fn mutate(&self, mut tool: ServerTool, topology: &Topology) -> ServerTool {
        if tool.name() != TARGET_LIST_SENTINEL {
            return tool;
        }

        let param = topology.parameter_name.clone();
        tool.tool.name = Cow::Owned(format!("{param}_list"));
        tool.tool.description = Some(Cow::Owned(format!(
            "List all available {param}s that can be selected with the '{param}' parameter of other tools"
        )));
        if let Some(annotations) = tool.tool.annotations.as_mut() {
            annotations.title = Some(format!("{}: List", capitalize(&param)));
        }

        let targets = topology.targets.clone();
        let default_target = topology.default_target.clone();
        tool.with_handler(move |_request: ToolRequest| {
            let text = render_target_list(&param, &targets, &default_target);
            async move { Ok(CallToolResult::success(vec![Content::text(text)])) }
        })
    }
}

fn render_target_list(param: &str, targets: &[String], default_target: &str) -> String {
    if targets.is_empty() {
        return format!("No {param}s available");
    }

    let mut sorted = targets.to_vec();
    sorted.sort();

    let mut out = format!("Available {param}s ({}):\n\n", sorted.len());
    for target in &sorted {
        if target == default_target {
            let _ = writeln!(out, "- {target} (default)");
        } else {
            let _ = writeln!(out, "- {target}");
        }
    }
    let _ = write!(
        out,
        "\nTo use a specific {param} with any tool, set the '{param}' parameter in the tool call arguments"
    );
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Mutators applied in order.
#[derive(Default)]
pub struct MutatorChain {
    mutators: Vec<Box<dyn ToolMutator>>,
}

impl MutatorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target-parameter injection, then target-list specialization.
    pub fn standard() -> Self {
        Self::new()
            .with(TargetParameterInjector)
            .with(TargetListSpecializer)
    }

    #[must_use]
    pub fn with(mut self, mutator: impl ToolMutator + 'static) -> Self {
        self.mutators.push(Box::new(mutator));
        self
    }
}

impl ToolMutator for MutatorChain {
    fn mutate(&self, tool: ServerTool, topology: &Topology) -> ServerTool {
        self.mutators
            .iter()
            .fold(tool, |tool, mutator| mutator.mutate(tool, topology))
    }
}
