//! Kubernetes implementations of the target provider contract.

use async_trait::async_trait;
use kms_mcp::{
    provider::{TargetChangeCallback, TargetWatch, WatchSlot},
    McpError, McpResult, TargetProvider, VerifiedToken,
};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use tracing::debug;

use super::{kubeconfig::KubeconfigSource, review_token, ClientCache, ClusterAccess};
use crate::error::{AppError, AppResult};

const CONTEXT_PARAMETER: &str = "context";
const CLUSTER_PARAMETER: &str = "cluster";
const IN_CLUSTER_TARGET: &str = "in-cluster";

async fn context_client(kubeconfig: Kubeconfig, context: &str) -> AppResult<Client> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options).await?;
    Ok(Client::try_from(config)?)
}

/// Targets are the contexts of one kubeconfig file.
///
/// Edits to the file fire the pending change subscription; targets are
/// re-read on every fetch.
pub struct KubeconfigProvider {
    source: KubeconfigSource,
    clients: ClientCache,
    slot: WatchSlot,
}

impl KubeconfigProvider {
    pub fn new(source: KubeconfigSource) -> Self {
        Self {
            source,
            clients: ClientCache::default(),
            slot: WatchSlot::new(),
        }
    }

    pub fn start_watching(&self) -> AppResult<()> {
        let clients = self.clients.clone();
        let slot = self.slot.clone();
        self.source.watch(move || {
            clients.clear();
            slot.fire();
        })
    }

    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl TargetProvider for KubeconfigProvider {
    async fn targets(&self) -> McpResult<Vec<String>> {
        let kubeconfig = self
            .source
            .refresh()
            .await
            .map_err(|e| McpError::TargetFetch(e.to_string()))?;
        Ok(super::kubeconfig::context_names(&kubeconfig))
    }

    fn default_target(&self) -> String {
        self.source.current_context().unwrap_or_default()
    }

    fn target_parameter_name(&self) -> String {
        CONTEXT_PARAMETER.to_string()
    }

    fn watch_targets(&self, on_change: TargetChangeCallback) -> TargetWatch {
        self.slot.arm(on_change)
    }

    async fn verify_token(
        &self,
        target: &str,
        token: &str,
        audience: Option<&str>,
    ) -> McpResult<VerifiedToken> {
        let client = self.client_for(target).await?;
        review_token(client, token, audience).await
    }

    async fn close(&self) {
        self.source.stop_watching();
        self.slot.disarm();
        self.clients.clear();
        debug!("Kubeconfig provider closed");
    }
}

#[async_trait]
impl ClusterAccess for KubeconfigProvider {
    async fn client_for(&self, target: &str) -> AppResult<Client> {
        if let Some(client) = self.clients.get(target) {
            return Ok(client);
        }
        if !self.source.context_names().iter().any(|c| c == target) {
            return Err(AppError::UnknownTarget(target.to_string()));
        }
        let client = context_client(self.source.kubeconfig(), target).await?;
        self.clients.insert(target, client.clone());
        Ok(client)
    }

    fn parameter_name(&self) -> String {
        CONTEXT_PARAMETER.to_string()
    }

    fn default_target(&self) -> String {
        TargetProvider::default_target(self)
    }

    fn kubeconfig(&self) -> Option<Kubeconfig> {
        Some(self.source.kubeconfig())
    }
}

enum SingleClusterMode {
    InCluster,
    CurrentContext(KubeconfigSource),
}

/// Exactly one target: the pod's own cluster or the kubeconfig's current context.
pub struct SingleClusterProvider {
    mode: SingleClusterMode,
    clients: ClientCache,
    slot: WatchSlot,
}

impl SingleClusterProvider {
    /// Use the pod's service account. The target never changes.
    pub fn in_cluster() -> Self {
        Self {
            mode: SingleClusterMode::InCluster,
            clients: ClientCache::default(),
            slot: WatchSlot::new(),
        }
    }

    pub fn current_context(source: KubeconfigSource) -> Self {
        Self {
            mode: SingleClusterMode::CurrentContext(source),
            clients: ClientCache::default(),
            slot: WatchSlot::new(),
        }
    }

    /// Fire the change subscription on kubeconfig edits. No-op in-cluster.
    pub fn start_watching(&self) -> AppResult<()> {
        match &self.mode {
            SingleClusterMode::InCluster => Ok(()),
            SingleClusterMode::CurrentContext(source) => {
                let clients = self.clients.clone();
                let slot = self.slot.clone();
                source.watch(move || {
                    clients.clear();
                    slot.fire();
                })
            }
        }
    }

    fn target(&self) -> String {
        match &self.mode {
            SingleClusterMode::InCluster => IN_CLUSTER_TARGET.to_string(),
            SingleClusterMode::CurrentContext(source) => {
                source.current_context().unwrap_or_default()
            }
        }
    }
}

#[async_trait]
impl TargetProvider for SingleClusterProvider {
    async fn targets(&self) -> McpResult<Vec<String>> {
        if let SingleClusterMode::CurrentContext(source) = &self.mode {
            source
                .refresh()
                .await
                .map_err(|e| McpError::TargetFetch(e.to_string()))?;
        }
        let target = self.target();
        if target.is_empty() {
            return Err(McpError::TargetFetch(
                "kubeconfig defines no contexts".to_string(),
            ));
        }
        Ok(vec![target])
    }

    fn default_target(&self) -> String {
        self.target()
    }

    fn target_parameter_name(&self) -> String {
        CLUSTER_PARAMETER.to_string()
    }

    fn watch_targets(&self, on_change: TargetChangeCallback) -> TargetWatch {
        self.slot.arm(on_change)
    }

    async fn verify_token(
        &self,
        target: &str,
        token: &str,
        audience: Option<&str>,
    ) -> McpResult<VerifiedToken> {
        let client = self.client_for(target).await?;
        review_token(client, token, audience).await
    }

    async fn close(&self) {
        if let SingleClusterMode::CurrentContext(source) = &self.mode {
            source.stop_watching();
        }
        self.slot.disarm();
        self.clients.clear();
        debug!("Single-cluster provider closed");
    }
}

#[async_trait]
impl ClusterAccess for SingleClusterProvider {
    async fn client_for(&self, target: &str) -> AppResult<Client> {
        let expected = self.target();
        if target != expected {
            return Err(AppError::UnknownTarget(target.to_string()));
        }
        if let Some(client) = self.clients.get(target) {
            return Ok(client);
        }
        let client = match &self.mode {
            SingleClusterMode::InCluster => Client::try_from(Config::incluster()?)?,
            SingleClusterMode::CurrentContext(source) => {
                context_client(source.kubeconfig(), target).await?
            }
        };
        self.clients.insert(target, client.clone());
        Ok(client)
    }

    fn parameter_name(&self) -> String {
        CLUSTER_PARAMETER.to_string()
    }

    fn default_target(&self) -> String {
        self.target()
    }

    fn kubeconfig(&self) -> Option<Kubeconfig> {
        match &self.mode {
            SingleClusterMode::InCluster => None,
            SingleClusterMode::CurrentContext(source) => Some(source.kubeconfig()),
        }
    }
}
