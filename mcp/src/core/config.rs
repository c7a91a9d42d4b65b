//! Registry configuration.
//!
//! [`ServerConfig`] is the file-level, serde-facing settings block. [`Configuration`]
//! wraps one immutable `ServerConfig` together with caches derived from it; a
//! configuration reload swaps in a fresh `Configuration`, which drops the caches.

use std::{collections::HashSet, fmt, path::Path, sync::Arc};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::{
    error::{McpError, McpResult},
    inventory::{ServerPrompt, Toolset, ToolsetRegistry},
    prompts,
    transform::PolicyFilter,
};

pub const ENV_WATCH_DEBOUNCE_MS: &str = "KMS_WATCH_DEBOUNCE_MS";
pub const ENV_WATCH_POLL_INTERVAL_MS: &str = "KMS_WATCH_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Expose only tools annotated read-only
    #[serde(default)]
    pub read_only: bool,

    /// Hide tools annotated destructive
    #[serde(default)]
    pub disable_destructive: bool,

    /// Allow-list of tool names (after renaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,

    /// Deny-list of tool names (after renaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_tools: Option<Vec<String>>,

    #[serde(default = "default_toolsets")]
    pub toolsets: Vec<String>,

    /// No sessions persist, so no list-changed notifications are sent
    #[serde(default)]
    pub stateless: bool,

    /// Prompts declared in configuration; they replace toolset prompts by name
    #[serde(default)]
    pub prompts: Vec<PromptDefinition>,

    #[serde(default)]
    pub list_output: ListOutput,

    #[serde(default)]
    pub require_oauth: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_audience: Option<String>,

    /// Gate tool calls on an `mcp:<tool>` scope. Off unless explicitly enabled;
    /// the scope policy is not settled yet.
    #[serde(default)]
    pub experimental_scope_authorization: bool,

    #[serde(default)]
    pub watch: WatchConfig,
}

/// Debounce and polling windows for the change watchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Reload when the configuration file changes on disk
    #[serde(default = "default_true")]
    pub watch_config: bool,
}

/// Rendering used by list-style tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOutput {
    #[default]
    Yaml,
    Table,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListOutput::Yaml => f.write_str("yaml"),
            ListOutput::Table => f.write_str("table"),
        }
    }
}

impl std::str::FromStr for ListOutput {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaml" => Ok(ListOutput::Yaml),
            "table" => Ok(ListOutput::Table),
            other => Err(McpError::Config(format!(
                "unknown list output '{other}', expected 'yaml' or 'table'"
            ))),
        }
    }
}

/// A prompt declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptDefinition {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub arguments: Vec<PromptArgumentDefinition>,

    pub messages: Vec<PromptMessageDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptArgumentDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub required: bool,
}

/// One message template; `{{name}}` placeholders are filled from prompt arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PromptMessageDefinition {
    #[serde(default)]
    pub role: PromptRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptRole {
    #[default]
    User,
    Assistant,
}

fn default_toolsets() -> Vec<String> {
    vec!["core".to_string(), "config".to_string()]
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_poll_interval_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            disable_destructive: false,
            enabled_tools: None,
            disabled_tools: None,
            toolsets: default_toolsets(),
            stateless: false,
            prompts: Vec::new(),
            list_output: ListOutput::default(),
            require_oauth: false,
            oauth_audience: None,
            experimental_scope_authorization: false,
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            watch_config: true,
        }
    }
}

impl ServerConfig {
    pub fn from_yaml(content: &str) -> McpResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from a YAML file
    pub async fn from_file(path: impl AsRef<Path>) -> McpResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }

    /// Apply `KMS_WATCH_*` environment overrides to the watch windows.
    ///
    /// Values that do not parse as milliseconds are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_millis(ENV_WATCH_DEBOUNCE_MS) {
            self.watch.debounce_ms = ms;
        }
        if let Some(ms) = env_millis(ENV_WATCH_POLL_INTERVAL_MS) {
            self.watch.poll_interval_ms = ms;
        }
        self
    }

    pub fn validate(&self) -> McpResult<()> {
        if let (Some(enabled), Some(disabled)) = (&self.enabled_tools, &self.disabled_tools) {
            let enabled: HashSet<&str> = enabled.iter().map(String::as_str).collect();
            let mut overlap: Vec<&str> = disabled
                .iter()
                .map(String::as_str)
                .filter(|name| enabled.contains(name))
                .collect();
            if !overlap.is_empty() {
                overlap.sort_unstable();
                return Err(McpError::Config(format!(
                    "tools listed as both enabled and disabled: {}",
                    overlap.join(", ")
                )));
            }
        }

        let mut seen = HashSet::new();
        for prompt in &self.prompts {
            if prompt.name.trim().is_empty() {
                return Err(McpError::Config("prompt name must not be empty".to_string()));
            }
            if !seen.insert(prompt.name.as_str()) {
                return Err(McpError::Config(format!(
                    "duplicate prompt definition '{}'",
                    prompt.name
                )));
            }
            if prompt.messages.is_empty() {
                return Err(McpError::Config(format!(
                    "prompt '{}' has no messages",
                    prompt.name
                )));
            }
        }

        if self.watch.poll_interval_ms == 0 {
            return Err(McpError::Config(
                "watch.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> PolicyFilter {
        PolicyFilter::new(
            self.read_only,
            self.disable_destructive,
            self.enabled_tools.as_deref(),
            self.disabled_tools.as_deref(),
        )
    }

    /// Whether the scope gate runs for tool calls.
    pub fn scope_authorization_enabled(&self) -> bool {
        self.require_oauth && self.experimental_scope_authorization
    }
}

fn env_millis(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// One immutable configuration plus its lazily derived caches.
pub struct Configuration {
    config: ServerConfig,
    toolsets: OnceCell<Vec<Arc<dyn Toolset>>>,
    prompts: OnceCell<Vec<ServerPrompt>>,
}

impl Configuration {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            toolsets: OnceCell::new(),
            prompts: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Enabled toolsets in registration order, resolved once.
    pub fn toolsets(&self, registry: &ToolsetRegistry) -> McpResult<&[Arc<dyn Toolset>]> {
        self.toolsets
            .get_or_try_init(|| registry.resolve(&self.config.toolsets))
            .map(Vec::as_slice)
    }

    /// Prompts declared in configuration, built once.
    pub fn configured_prompts(&self) -> &[ServerPrompt] {
        self.prompts
            .get_or_init(|| prompts::from_definitions(&self.config.prompts))
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("config", &self.config)
            .field("toolsets_resolved", &self.toolsets.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.toolsets, vec!["core", "config"]);
        assert_eq!(config.list_output, ListOutput::Yaml);
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.watch.poll_interval_ms, 30_000);
        assert!(config.watch.watch_config);
        assert!(!config.experimental_scope_authorization);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ServerConfig::from_yaml("").unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
read_only: true
disabled_tools: [pods_delete]
toolsets: [core]
list_output: table
watch:
  debounce_ms: 10
prompts:
  - name: restart-check
    description: Check restarts
    arguments:
      - name: namespace
        required: true
    messages:
      - content: "Look at restarts in {{namespace}}"
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert!(config.read_only);
        assert_eq!(config.disabled_tools, Some(vec!["pods_delete".to_string()]));
        assert_eq!(config.list_output, ListOutput::Table);
        assert_eq!(config.watch.debounce_ms, 10);
        assert_eq!(config.watch.poll_interval_ms, 30_000);
        assert_eq!(config.prompts.len(), 1);
        assert_eq!(config.prompts[0].messages[0].role, PromptRole::User);
        assert!(config.prompts[0].arguments[0].required);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_overlapping_lists() {
        let config = ServerConfig {
            enabled_tools: Some(vec!["pods_list".into(), "pods_get".into()]),
            disabled_tools: Some(vec!["pods_get".into()]),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pods_get"));
    }

    #[test]
    fn test_validate_duplicate_prompts() {
        let prompt = PromptDefinition {
            name: "dup".into(),
            title: None,
            description: String::new(),
            arguments: vec![],
            messages: vec![PromptMessageDefinition {
                role: PromptRole::User,
                content: "hi".into(),
            }],
        };
        let config = ServerConfig {
            prompts: vec![prompt.clone(), prompt],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_list_output_from_str() {
        assert_eq!("table".parse::<ListOutput>().unwrap(), ListOutput::Table);
        assert!("json".parse::<ListOutput>().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(ENV_WATCH_DEBOUNCE_MS, "5");
        std::env::set_var(ENV_WATCH_POLL_INTERVAL_MS, "not-a-number");
        let config = ServerConfig::default().with_env_overrides();
        std::env::remove_var(ENV_WATCH_DEBOUNCE_MS);
        std::env::remove_var(ENV_WATCH_POLL_INTERVAL_MS);

        assert_eq!(config.watch.debounce_ms, 5);
        assert_eq!(config.watch.poll_interval_ms, 30_000);
    }

    #[test]
    fn test_scope_authorization_needs_both_flags() {
        let mut config = ServerConfig {
            require_oauth: true,
            ..Default::default()
        };
        assert!(!config.scope_authorization_enabled());
        config.experimental_scope_authorization = true;
        assert!(config.scope_authorization_enabled());
    }

    #[test]
    fn test_unknown_toolset_rejected_on_resolve() {
        let config = Configuration::new(ServerConfig {
            toolsets: vec!["helm".into()],
            ..Default::default()
        });
        let registry = ToolsetRegistry::new();
        assert!(matches!(
            config.toolsets(&registry),
            Err(McpError::UnknownToolset(_))
        ));
    }
}
