//! Target provider contract.
//!
//! A provider enumerates the targets (clusters, contexts) tools can be directed at,
//! names the parameter used to select one, verifies bearer tokens against a target
//! and offers a one-shot change subscription.
//!
//! Subscriptions are explicit: [`TargetProvider::watch_targets`] returns a
//! [`TargetWatch`] handle, the callback fires at most once, and the registry
//! re-subscribes after every reload. Dropping the handle cancels the subscription.

pub mod mock;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::McpResult;

pub use mock::MockTargetProvider;

/// Callback fired once when the provider observes a topology change.
pub type TargetChangeCallback = Box<dyn FnOnce() + Send + 'static>;

/// Identity returned by a successful token verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedToken {
    pub identity: String,
    pub scopes: Vec<String>,
}

impl VerifiedToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// Current target identifiers. May perform network I/O.
    async fn targets(&self) -> McpResult<Vec<String>>;

    fn default_target(&self) -> String;

    /// Display name of the target-selection parameter, e.g. `cluster` or `context`.
    fn target_parameter_name(&self) -> String;

    /// Register a one-shot change callback.
    fn watch_targets(&self, on_change: TargetChangeCallback) -> TargetWatch;

    async fn verify_token(
        &self,
        target: &str,
        token: &str,
        audience: Option<&str>,
    ) -> McpResult<VerifiedToken>;

    /// Release watches and cached clients.
    async fn close(&self);
}

#[derive(Default)]
struct SlotState {
    generation: u64,
    callback: Option<TargetChangeCallback>,
}

/// Holds at most one pending subscription callback.
///
/// Providers own a slot and fire it from their change detector; arming a new
/// callback replaces any previous one.
#[derive(Default, Clone)]
pub struct WatchSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl WatchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot and return the handle that owns the subscription.
    pub fn arm(&self, callback: TargetChangeCallback) -> TargetWatch {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.callback = Some(callback);
        TargetWatch {
            slot: Arc::downgrade(&self.inner),
            generation: state.generation,
        }
    }

    /// Take and run the pending callback. Returns whether one was armed.
    pub fn fire(&self) -> bool {
        // Run outside the lock: the callback may re-arm this slot.
        let callback = self.inner.lock().callback.take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().callback.is_some()
    }

    pub fn disarm(&self) {
        self.inner.lock().callback = None;
    }
}

/// Subscription handle returned by [`TargetProvider::watch_targets`].
///
/// Dropping it cancels the subscription unless the slot has since been re-armed.
pub struct TargetWatch {
    slot: Weak<Mutex<SlotState>>,
    generation: u64,
}

impl TargetWatch {
    /// A handle for providers that never observe changes.
    pub fn inert() -> Self {
        Self {
            slot: Weak::new(),
            generation: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.slot.upgrade().is_some_and(|slot| {
            let state = slot.lock();
            state.generation == self.generation && state.callback.is_some()
        })
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for TargetWatch {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut state = slot.lock();
            if state.generation == self.generation {
                state.callback = None;
            }
        }
    }
}

impl std::fmt::Debug for TargetWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetWatch")
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> TargetChangeCallback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_slot_fires_once() {
        let slot = WatchSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let watch = slot.arm(counting(&fired));

        assert!(watch.is_active());
        assert!(slot.fire());
        assert!(!slot.fire());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!watch.is_active());
    }

    #[test]
    fn test_drop_cancels_subscription() {
        let slot = WatchSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let watch = slot.arm(counting(&fired));
        drop(watch);

        assert!(!slot.is_armed());
        assert!(!slot.fire());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_handle_does_not_cancel_rearmed_slot() {
        let slot = WatchSlot::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let first = slot.arm(counting(&fired));
        let second = slot.arm(counting(&fired));

        drop(first);
        assert!(slot.is_armed());
        assert!(second.is_active());

        slot.fire();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_callback_can_rearm() {
        let slot = WatchSlot::new();
        let rearmed: Arc<Mutex<Option<TargetWatch>>> = Arc::new(Mutex::new(None));

        let slot_clone = slot.clone();
        let holder = rearmed.clone();
        let _watch = slot.arm(Box::new(move || {
            let watch = slot_clone.arm(Box::new(|| {}));
            *holder.lock() = Some(watch);
        }));

        slot.fire();
        assert!(slot.is_armed());
        assert!(rearmed.lock().as_ref().is_some_and(TargetWatch::is_active));
    }

    #[test]
    fn test_inert_watch() {
        let watch = TargetWatch::inert();
        assert!(!watch.is_active());
        watch.cancel();
    }

    #[test]
    fn test_verified_token_scopes() {
        let token = VerifiedToken {
            identity: "alice".to_string(),
            scopes: vec!["mcp:pods_list".to_string()],
        };
        assert!(token.has_scope("mcp:pods_list"));
        assert!(!token.has_scope("mcp:pods_delete"));
    }
}
