//! Kubernetes target providers and cluster access for tool handlers.
//!
//! - [`KubeconfigProvider`]: every kubeconfig context is a target
//! - [`SingleClusterProvider`]: one target, in-cluster or the current context
//! - [`ApiSurfaceFingerprint`]: API group fingerprint for the topology poller

pub mod kubeconfig;
mod provider;
mod surface;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec};
use kms_mcp::{McpError, McpResult, TargetProvider, ToolRequest, VerifiedToken};
use kube::{
    api::{Api, PostParams},
    config::Kubeconfig,
    Client,
};
use tracing::{debug, info, warn};

pub use kubeconfig::KubeconfigSource;
pub use surface::ApiSurfaceFingerprint;
pub use provider::{KubeconfigProvider, SingleClusterProvider};

use crate::{
    config::{AppConfig, ClusterProviderKind},
    error::AppResult,
};

/// Client access used by tool handlers, implemented by every provider.
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    /// A client for `target`, built once and cached.
    async fn client_for(&self, target: &str) -> AppResult<Client>;

    fn parameter_name(&self) -> String;

    fn default_target(&self) -> String;

    /// The kubeconfig behind the targets, when there is one.
    fn kubeconfig(&self) -> Option<Kubeconfig>;

    /// The target named by the request's target parameter, or the default.
    fn target_of(&self, request: &ToolRequest) -> String {
        request
            .str_arg(&self.parameter_name())
            .filter(|target| !target.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_target())
    }
}

/// Per-target client cache.
#[derive(Clone, Default)]
pub struct ClientCache {
    clients: Arc<DashMap<String, Client>>,
}

impl ClientCache {
    pub fn get(&self, target: &str) -> Option<Client> {
        self.clients.get(target).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, target: &str, client: Client) {
        self.clients.insert(target.to_string(), client);
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}

/// Authenticate `token` with a `TokenReview` on the target cluster.
///
/// Accepted audiences are reported as the token's scopes.
pub async fn review_token(
    client: Client,
    token: &str,
    audience: Option<&str>,
) -> McpResult<VerifiedToken> {
    let review = TokenReview {
        spec: TokenReviewSpec {
            token: Some(token.to_string()),
            audiences: audience.map(|a| vec![a.to_string()]),
        },
        ..Default::default()
    };
    let reviewed = Api::<TokenReview>::all(client)
        .create(&PostParams::default(), &review)
        .await
        .map_err(|e| McpError::Auth(format!("token review failed: {e}")))?;

    let status = reviewed
        .status
        .ok_or_else(|| McpError::Auth("token review returned no status".to_string()))?;
    if status.authenticated != Some(true) {
        return Err(McpError::Auth(
            status
                .error
                .unwrap_or_else(|| "token not authenticated".to_string()),
        ));
    }

    let identity = status
        .user
        .and_then(|user| user.username)
        .unwrap_or_default();
    debug!(identity = %identity, "Token review passed");
    Ok(VerifiedToken {
        identity,
        scopes: status.audiences.unwrap_or_default(),
    })
}

/// The configured provider, viewed both as the registry's target source and as
/// client access for handlers.
pub struct Cluster {
    pub provider: Arc<dyn TargetProvider>,
    pub access: Arc<dyn ClusterAccess>,
}

impl Cluster {
    pub fn new<P>(provider: Arc<P>) -> Self
    where
        P: TargetProvider + ClusterAccess + 'static,
    {
        Self {
            provider: provider.clone(),
            access: provider,
        }
    }
}

pub fn connect(config: &AppConfig) -> AppResult<Cluster> {
    let kind = config.cluster_provider;
    let cluster = match kind {
        ClusterProviderKind::InCluster => Cluster::new(Arc::new(SingleClusterProvider::in_cluster())),
        ClusterProviderKind::Kubeconfig | ClusterProviderKind::Disabled => {
            let path = kubeconfig::resolve_path(config.kubeconfig.as_deref())?;
            let source = KubeconfigSource::load(&path)?;
            if kind == ClusterProviderKind::Kubeconfig {
                let provider = Arc::new(KubeconfigProvider::new(source));
                if let Err(e) = provider.start_watching() {
                    warn!(error = %e, "Kubeconfig changes will not be observed");
                }
                Cluster::new(provider)
            } else {
                let provider = Arc::new(SingleClusterProvider::current_context(source));
                if let Err(e) = provider.start_watching() {
                    warn!(error = %e, "Kubeconfig changes will not be observed");
                }
                Cluster::new(provider)
            }
        }
    };
    info!(
        provider = kind.as_str(),
        parameter = %cluster.access.parameter_name(),
        default_target = %cluster.access.default_target(),
        "Cluster provider ready"
    );
    Ok(cluster)
}
