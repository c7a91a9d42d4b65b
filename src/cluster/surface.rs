//! API-surface fingerprint for the topology poller.

use std::sync::Arc;

use async_trait::async_trait;
use kms_mcp::{watch::CapabilitySource, McpError, McpResult};

use super::ClusterAccess;

/// Fingerprints the group/versions served by the default target.
///
/// Installing or removing a CRD group changes the fingerprint, which lets
/// toolsets that depend on optional APIs appear or disappear.
pub struct ApiSurfaceFingerprint {
    access: Arc<dyn ClusterAccess>,
}

impl ApiSurfaceFingerprint {
    pub fn new(access: Arc<dyn ClusterAccess>) -> Self {
        Self { access }
    }
}

#[async_trait]
impl CapabilitySource for ApiSurfaceFingerprint {
    async fn fingerprint(&self) -> McpResult<String> {
        let target = self.access.default_target();
        let client = self.access.client_for(&target).await?;

        let core = client
            .list_core_api_versions()
            .await
            .map_err(|e| McpError::Provider(e.to_string()))?;
        let groups = client
            .list_api_groups()
            .await
            .map_err(|e| McpError::Provider(e.to_string()))?;

        let group_versions = core.versions.into_iter().chain(
            groups
                .groups
                .into_iter()
                .flat_map(|group| group.versions.into_iter().map(|v| v.group_version)),
        );
        Ok(fingerprint(group_versions))
    }
}

/// Sorted, de-duplicated, comma-joined group/versions.
fn fingerprint(group_versions: impl IntoIterator<Item = String>) -> String {
    let mut all: Vec<String> = group_versions.into_iter().collect();
    all.sort();
    all.dedup();
    all.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_order_independent() {
        let a = fingerprint(["v1", "apps/v1", "batch/v1"].map(String::from));
        let b = fingerprint(["batch/v1", "v1", "apps/v1", "apps/v1"].map(String::from));
        assert_eq!(a, b);
        assert_eq!(a, "apps/v1,batch/v1,v1");
    }

    #[test]
    fn test_fingerprint_changes_with_new_group() {
        let before = fingerprint(["v1", "apps/v1"].map(String::from));
        let after = fingerprint(["v1", "apps/v1", "kubevirt.io/v1"].map(String::from));
        assert_ne!(before, after);
    }
}
