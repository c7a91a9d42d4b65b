//! Live session registry.
//!
//! Holds the tools and prompts currently served to clients and the peers of
//! connected stateful sessions. The reload controller is its only writer; each
//! patch is applied under a single write lock so a concurrent `tools/list` or
//! `tools/call` sees either the previous or the next registry, never a mix.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use parking_lot::RwLock;
use rmcp::{service::Peer, RoleServer};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::inventory::{ServerPrompt, ServerTool};

/// List-changed notification kinds, also broadcast locally for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChanged {
    Tools,
    Prompts,
}

pub type PeerId = u64;

pub struct SessionRegistry {
    tools: RwLock<BTreeMap<String, ServerTool>>,
    prompts: RwLock<BTreeMap<String, ServerPrompt>>,
    peers: DashMap<PeerId, Peer<RoleServer>>,
    next_peer_id: AtomicU64,
    events: broadcast::Sender<ListChanged>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            tools: RwLock::new(BTreeMap::new()),
            prompts: RwLock::new(BTreeMap::new()),
            peers: DashMap::new(),
            next_peer_id: AtomicU64::new(1),
            events,
        }
    }

    // --- Tools ---

    /// Remove `remove`, then add or replace every tool in `add`, atomically.
    pub fn apply_tools(&self, remove: &[String], add: Vec<ServerTool>) {
        let mut tools = self.tools.write();
        for name in remove {
            tools.remove(name);
        }
        for tool in add {
            tools.insert(tool.name().to_string(), tool);
        }
    }

    pub fn tool(&self, name: &str) -> Option<ServerTool> {
        self.tools.read().get(name).cloned()
    }

    /// Snapshot of the served tools, sorted by name.
    pub fn tools(&self) -> Vec<ServerTool> {
        self.tools.read().values().cloned().collect()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    // --- Prompts ---

    /// Remove `remove`, then add or replace every prompt in `add`, atomically.
    pub fn apply_prompts(&self, remove: &[String], add: Vec<ServerPrompt>) {
        let mut prompts = self.prompts.write();
        for name in remove {
            prompts.remove(name);
        }
        for prompt in add {
            prompts.insert(prompt.name().to_string(), prompt);
        }
    }

    pub fn prompt(&self, name: &str) -> Option<ServerPrompt> {
        self.prompts.read().get(name).cloned()
    }

    pub fn prompts(&self) -> Vec<ServerPrompt> {
        self.prompts.read().values().cloned().collect()
    }

    pub fn prompt_names(&self) -> Vec<String> {
        self.prompts.read().keys().cloned().collect()
    }

    // --- Peers ---

    /// Track a stateful session so it receives list-changed notifications.
    pub fn add_peer(&self, peer: Peer<RoleServer>) -> PeerId {
        let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed);
        self.peers.insert(id, peer);
        debug!(peer_id = id, peers = self.peers.len(), "Session registered");
        id
    }

    pub fn remove_peer(&self, id: PeerId) {
        if self.peers.remove(&id).is_some() {
            debug!(peer_id = id, peers = self.peers.len(), "Session removed");
        }
    }

    pub fn contains_peer(&self, id: PeerId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Local observers of emitted notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ListChanged> {
        self.events.subscribe()
    }

    /// Send `notifications/tools/list_changed` to every live session.
    pub async fn notify_tools_changed(&self) {
        self.notify(ListChanged::Tools).await;
    }

    /// Send `notifications/prompts/list_changed` to every live session.
    pub async fn notify_prompts_changed(&self) {
        self.notify(ListChanged::Prompts).await;
    }

    async fn notify(&self, kind: ListChanged) {
        // Clone out so no map shard is held across an await.
        let peers: Vec<(PeerId, Peer<RoleServer>)> = self
            .peers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        for (id, peer) in peers {
            let sent = match kind {
                ListChanged::Tools => peer.notify_tool_list_changed().await,
                ListChanged::Prompts => peer.notify_prompt_list_changed().await,
            };
            if let Err(e) = sent {
                warn!(peer_id = id, error = %e, "Dropping session after failed notification");
                self.peers.remove(&id);
            }
        }

        // No receivers is fine
        let _ = self.events.send(kind);
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
