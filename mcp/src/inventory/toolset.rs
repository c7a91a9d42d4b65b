//! Toolsets and the ordered registry they are registered into.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::types::{ServerPrompt, ServerTool};
use crate::{
    error::{McpError, McpResult},
    provider::TargetProvider,
};

/// A named bundle of tools and prompts contributed as a unit.
///
/// Both lists are requested again on every reload, so a toolset may vary
/// what it contributes with the provider's topology.
#[async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    async fn list_tools(&self, provider: &dyn TargetProvider) -> McpResult<Vec<ServerTool>>;

    fn list_prompts(&self) -> Vec<ServerPrompt> {
        Vec::new()
    }
}

/// Ordered, append-only collection of toolsets.
///
/// Built once at startup and handed to the server, so independent servers
/// never share registration history.
#[derive(Default)]
pub struct ToolsetRegistry {
    toolsets: RwLock<Vec<Arc<dyn Toolset>>>,
}

impl ToolsetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a toolset. Registering a second toolset under an existing name is rejected.
    pub fn register(&self, toolset: Arc<dyn Toolset>) -> McpResult<()> {
        let mut toolsets = self.toolsets.write();
        if toolsets.iter().any(|t| t.name() == toolset.name()) {
            return Err(McpError::Config(format!(
                "toolset '{}' is already registered",
                toolset.name()
            )));
        }
        toolsets.push(toolset);
        Ok(())
    }

    pub fn with(self, toolset: Arc<dyn Toolset>) -> McpResult<Self> {
        self.register(toolset)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Toolset>> {
        self.toolsets.read().iter().find(|t| t.name() == name).cloned()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.toolsets
            .read()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.toolsets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.toolsets.read().is_empty()
    }

    /// Resolve the requested names to toolsets, kept in registration order.
    ///
    /// Unknown names are an error; duplicates are ignored.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> McpResult<Vec<Arc<dyn Toolset>>> {
        let toolsets = self.toolsets.read();
        for name in names {
            let name = name.as_ref();
            if !toolsets.iter().any(|t| t.name() == name) {
                return Err(McpError::UnknownToolset(name.to_string()));
            }
        }
        Ok(toolsets
            .iter()
            .filter(|t| names.iter().any(|n| n.as_ref() == t.name()))
            .cloned()
            .collect())
    }

    /// Drop every registration. Test harnesses only.
    pub fn clear(&self) {
        self.toolsets.write().clear();
    }
}

impl std::fmt::Debug for ToolsetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsetRegistry")
            .field("toolsets", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Toolset for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test toolset"
        }

        async fn list_tools(&self, _provider: &dyn TargetProvider) -> McpResult<Vec<ServerTool>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> ToolsetRegistry {
        let registry = ToolsetRegistry::new();
        registry.register(Arc::new(Named("core"))).unwrap();
        registry.register(Arc::new(Named("config"))).unwrap();
        registry.register(Arc::new(Named("helm"))).unwrap();
        registry
    }

    #[test]
    fn test_resolve_keeps_registration_order() {
        let registry = registry();
        let resolved = registry.resolve(&["helm", "core"]).unwrap();
        let names: Vec<_> = resolved.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["core", "helm"]);
    }

    #[test]
    fn test_resolve_unknown_toolset() {
        let registry = registry();
        let err = registry.resolve(&["core", "kubevirt"]).err().unwrap();
        assert!(matches!(err, McpError::UnknownToolset(name) if name == "kubevirt"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = registry();
        assert!(registry.register(Arc::new(Named("core"))).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_clear() {
        let registry = registry();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("core").is_none());
    }
}
