//! Change watchers that feed the reload controller.
//!
//! Both watchers turn raw change signals into debounced reload requests:
//! [`ConfigWatcher`] for the configuration file, [`TopologyPoller`] for the
//! remote capability surface.

mod config_file;
mod debounce;
mod topology;

use async_trait::async_trait;

pub use config_file::{yaml_loader, ConfigLoader, ConfigWatcher};
pub use debounce::{debouncer, DebounceHandle, Debouncer};
pub use topology::{CapabilitySource, TopologyPoller};

use crate::{core::config::ServerConfig, error::McpResult};

/// Receiver of debounced reload requests.
#[async_trait]
pub trait Reloadable: Send + Sync {
    /// Rebuild the registry against current targets.
    async fn reload(&self) -> McpResult<()>;

    /// Swap in a new configuration, then rebuild.
    async fn reload_configuration(&self, config: ServerConfig) -> McpResult<()>;
}
