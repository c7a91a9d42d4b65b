//! In-memory provider for tests and embedding.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{TargetChangeCallback, TargetProvider, TargetWatch, VerifiedToken, WatchSlot};
use crate::error::{McpError, McpResult};

#[derive(Debug)]
struct MockState {
    targets: Vec<String>,
    default_target: String,
    parameter_name: String,
    fail_with: Option<String>,
}

/// A [`TargetProvider`] whose topology is set by hand.
///
/// Every token is accepted; the verified identity is the token itself and the
/// granted scopes come from [`MockTargetProvider::set_scopes`].
#[derive(Clone)]
pub struct MockTargetProvider {
    state: Arc<RwLock<MockState>>,
    scopes: Arc<RwLock<Vec<String>>>,
    slot: WatchSlot,
    fetches: Arc<AtomicUsize>,
    subscriptions: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl MockTargetProvider {
    pub fn new(targets: &[&str], default_target: &str) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState {
                targets: targets.iter().map(|t| t.to_string()).collect(),
                default_target: default_target.to_string(),
                parameter_name: "cluster".to_string(),
                fail_with: None,
            })),
            scopes: Arc::new(RwLock::new(Vec::new())),
            slot: WatchSlot::new(),
            fetches: Arc::new(AtomicUsize::new(0)),
            subscriptions: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_parameter_name(self, name: &str) -> Self {
        self.state.write().parameter_name = name.to_string();
        self
    }

    pub fn set_targets(&self, targets: &[&str]) {
        self.state.write().targets = targets.iter().map(|t| t.to_string()).collect();
    }

    pub fn set_default(&self, default_target: &str) {
        self.state.write().default_target = default_target.to_string();
    }

    /// Make subsequent `targets()` calls fail, or succeed again with `None`.
    pub fn set_failing(&self, message: Option<&str>) {
        self.state.write().fail_with = message.map(str::to_string);
    }

    pub fn set_scopes(&self, scopes: &[&str]) {
        *self.scopes.write() = scopes.iter().map(|s| s.to_string()).collect();
    }

    /// Simulate a topology change. Returns whether a subscription was armed.
    pub fn fire_change(&self) -> bool {
        self.slot.fire()
    }

    pub fn is_watching(&self) -> bool {
        self.slot.is_armed()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TargetProvider for MockTargetProvider {
    async fn targets(&self) -> McpResult<Vec<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read();
        match &state.fail_with {
            Some(message) => Err(McpError::TargetFetch(message.clone())),
            None => Ok(state.targets.clone()),
        }
    }

    fn default_target(&self) -> String {
        self.state.read().default_target.clone()
    }

    fn target_parameter_name(&self) -> String {
        self.state.read().parameter_name.clone()
    }

    fn watch_targets(&self, on_change: TargetChangeCallback) -> TargetWatch {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        self.slot.arm(on_change)
    }

    async fn verify_token(
        &self,
        _target: &str,
        token: &str,
        _audience: Option<&str>,
    ) -> McpResult<VerifiedToken> {
        if token.is_empty() {
            return Err(McpError::Auth("empty bearer token".to_string()));
        }
        Ok(VerifiedToken {
            identity: token.to_string(),
            scopes: self.scopes.read().clone(),
        })
    }

    async fn close(&self) {
        self.slot.disarm();
        self.closed.store(true, Ordering::SeqCst);
    }
}
