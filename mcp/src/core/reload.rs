//! Registry reload controller.
//!
//! One reload pass runs `Fetching -> Computing -> Patching -> Notifying -> Idle`:
//!
//! 1. fetch targets and the default target from the provider; on failure the
//!    registry is left exactly as it was
//! 2. run every enabled toolset's tools through the mutator chain and filters
//! 3. diff against the enabled names, remove stale tools, then add or replace
//! 4. merge toolset prompts with configured prompts and patch them the same way
//! 5. re-arm the provider's one-shot change subscription
//! 6. notify connected sessions unless the transport is stateless
//!
//! Fetching and computing may await network I/O and run without the registry
//! lock. Patching and notifying run under it, so overlapping passes never
//! interleave their diffs; a pass that finishes computing after a newer pass
//! has committed is discarded.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{
    config::{Configuration, ServerConfig},
    metrics::{McpMetrics, ReloadOutcome},
    session::SessionRegistry,
};
use crate::{
    annotations,
    error::{McpError, McpResult},
    inventory::{ServerPrompt, ServerTool, ToolsetRegistry},
    prompts::merge_prompts,
    provider::{TargetProvider, TargetWatch},
    transform::{Pipeline, Topology},
    watch::Reloadable,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPhase {
    Idle,
    Fetching,
    Computing,
    Patching,
    Notifying,
}

/// Consistent view of the registry after the most recent committed reload.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub tools: BTreeSet<String>,
    pub prompts: BTreeSet<String>,
    pub topology: Option<Topology>,
}

/// What one reload pass did.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub generation: u64,
    pub outcome: ReloadOutcome,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub tools: usize,
    pub prompts: usize,
    pub prompts_changed: bool,
}

#[derive(Default)]
struct RegistryState {
    enabled_tools: BTreeSet<String>,
    enabled_prompts: BTreeSet<String>,
    committed_generation: u64,
}

/// Output of the compute phase.
struct Computed {
    topology: Topology,
    tools: Vec<ServerTool>,
    prompts: Vec<ServerPrompt>,
}

pub struct ReloadController {
    configuration: Arc<ArcSwap<Configuration>>,
    provider: Arc<dyn TargetProvider>,
    toolsets: Arc<ToolsetRegistry>,
    sessions: Arc<SessionRegistry>,
    metrics: Arc<McpMetrics>,
    state: tokio::sync::Mutex<RegistryState>,
    snapshot: ArcSwap<RegistrySnapshot>,
    phase: Mutex<ReloadPhase>,
    generation: AtomicU64,
    watch: Mutex<Option<TargetWatch>>,
    closed: AtomicBool,
    runtime: Handle,
    self_ref: Weak<ReloadController>,
}

impl ReloadController {
    /// Build the controller. No reload is performed.
    pub fn new(
        configuration: Arc<ArcSwap<Configuration>>,
        provider: Arc<dyn TargetProvider>,
        toolsets: Arc<ToolsetRegistry>,
        sessions: Arc<SessionRegistry>,
        metrics: Arc<McpMetrics>,
    ) -> McpResult<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| McpError::Config(format!("reload controller needs a tokio runtime: {e}")))?;

        Ok(Arc::new_cyclic(|self_ref| Self {
            configuration,
            provider,
            toolsets,
            sessions,
            metrics,
            state: tokio::sync::Mutex::new(RegistryState::default()),
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::default()),
            phase: Mutex::new(ReloadPhase::Idle),
            generation: AtomicU64::new(0),
            watch: Mutex::new(None),
            closed: AtomicBool::new(false),
            runtime,
            self_ref: self_ref.clone(),
        }))
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.configuration.load_full()
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot.load_full()
    }

    pub fn phase(&self) -> ReloadPhase {
        *self.phase.lock()
    }

    pub fn is_watching(&self) -> bool {
        self.watch.lock().as_ref().is_some_and(TargetWatch::is_active)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Run one full reload pass.
    ///
    /// Target-fetch and compute failures leave the registry untouched and are
    /// returned; the change subscription is re-armed either way.
    pub async fn reload(&self) -> McpResult<ReloadReport> {
        if self.is_closed() {
            return Err(McpError::Closed);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let configuration = self.configuration.load_full();

        let computed = match self.compute(generation, &configuration).await {
            Ok(computed) => computed,
            Err(e) => {
                let outcome = if e.is_target_fetch() {
                    warn!(generation, error = %e, "Target fetch failed, keeping current registry");
                    ReloadOutcome::FetchFailed
                } else {
                    warn!(generation, error = %e, "Reload aborted, keeping current registry");
                    ReloadOutcome::Failed
                };
                self.metrics.record_reload(outcome);
                self.rearm();
                self.set_phase(generation, ReloadPhase::Idle);
                return Err(e);
            }
        };

        let report = self.patch(generation, &configuration, computed).await;
        self.metrics.record_reload(report.outcome);
        self.set_phase(generation, ReloadPhase::Idle);
        Ok(report)
    }

    /// Validate and swap in a new configuration, then reload.
    ///
    /// An invalid configuration is rejected before anything changes. Once
    /// swapped in, the configuration stays even if the following reload fails;
    /// the next trigger applies it.
    pub async fn reload_configuration(&self, config: ServerConfig) -> McpResult<ReloadReport> {
        config.validate()?;
        let next = Configuration::new(config);
        next.toolsets(&self.toolsets)?;
        self.configuration.store(Arc::new(next));
        info!("Configuration updated");
        self.reload().await
    }

    /// Log-only wrapper for reloads started by watchers.
    pub async fn reload_logged(&self, reason: &str) {
        match self.reload().await {
            Ok(report) => info!(
                reason,
                generation = report.generation,
                outcome = report.outcome.as_str(),
                tools = report.tools,
                prompts = report.prompts,
                added = report.added.len(),
                removed = report.removed.len(),
                "Registry reloaded"
            ),
            Err(McpError::Closed) => debug!(reason, "Reload skipped, server closed"),
            Err(e) => warn!(reason, error = %e, "Registry reload failed"),
        }
    }

    /// Stop reacting to provider changes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the handle cancels the subscription.
        self.watch.lock().take();
    }

    async fn compute(&self, generation: u64, configuration: &Configuration) -> McpResult<Computed> {
        self.set_phase(generation, ReloadPhase::Fetching);
        let targets = self.provider.targets().await.map_err(|e| match e {
            McpError::TargetFetch(_) => e,
            other => McpError::TargetFetch(other.to_string()),
        })?;
        let topology = Topology::new(
            targets,
            self.provider.default_target(),
            self.provider.target_parameter_name(),
        );

        self.set_phase(generation, ReloadPhase::Computing);
        let pipeline = Pipeline::new(&topology, configuration.config().policy());
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut tools = Vec::new();
        let mut base_prompts = Vec::new();

        for toolset in configuration.toolsets(&self.toolsets)? {
            let contributed = toolset
                .list_tools(self.provider.as_ref())
                .await
                .map_err(|e| McpError::toolset(toolset.name(), e))?;

            for tool in contributed {
                annotations::validate(&tool.tool)?;
                let Some(tool) = pipeline.apply(tool) else {
                    continue;
                };
                if let Some(owner) = owners.insert(tool.name().to_string(), toolset.name().to_string()) {
                    return Err(McpError::ToolCollision {
                        tool_name: tool.name().to_string(),
                        toolsets: vec![owner, toolset.name().to_string()],
                    });
                }
                tools.push(tool);
            }
            base_prompts.extend(toolset.list_prompts());
        }

        let prompts = merge_prompts(base_prompts, configuration.configured_prompts().to_vec());
        Ok(Computed {
            topology,
            tools,
            prompts,
        })
    }

    async fn patch(
        &self,
        generation: u64,
        configuration: &Configuration,
        computed: Computed,
    ) -> ReloadReport {
        self.set_phase(generation, ReloadPhase::Patching);
        let mut state = self.state.lock().await;

        if generation < state.committed_generation {
            debug!(
                generation,
                committed = state.committed_generation,
                "Discarding reload superseded by a newer one"
            );
            return ReloadReport {
                generation,
                outcome: ReloadOutcome::Superseded,
                added: Vec::new(),
                removed: Vec::new(),
                tools: state.enabled_tools.len(),
                prompts: state.enabled_prompts.len(),
                prompts_changed: false,
            };
        }

        let Computed {
            topology,
            tools,
            prompts,
        } = computed;

        let tool_names: BTreeSet<String> = tools.iter().map(|t| t.name().to_string()).collect();
        let removed: Vec<String> = state.enabled_tools.difference(&tool_names).cloned().collect();
        let added: Vec<String> = tool_names.difference(&state.enabled_tools).cloned().collect();
        self.sessions.apply_tools(&removed, tools);

        // Later prompts in the merged list win, matching the registry's insert order.
        let prompt_names: BTreeSet<String> = prompts.iter().map(|p| p.name().to_string()).collect();
        let removed_prompts: Vec<String> = state
            .enabled_prompts
            .difference(&prompt_names)
            .cloned()
            .collect();
        let prompts_changed = prompt_names != state.enabled_prompts;
        self.sessions.apply_prompts(&removed_prompts, prompts);

        state.enabled_tools = tool_names;
        state.enabled_prompts = prompt_names;
        state.committed_generation = generation;
        self.snapshot.store(Arc::new(RegistrySnapshot {
            generation,
            tools: state.enabled_tools.clone(),
            prompts: state.enabled_prompts.clone(),
            topology: Some(topology),
        }));
        self.metrics
            .set_enabled(state.enabled_tools.len(), state.enabled_prompts.len());

        self.rearm();

        if !configuration.config().stateless {
            self.set_phase(generation, ReloadPhase::Notifying);
            self.sessions.notify_tools_changed().await;
            if prompts_changed {
                self.sessions.notify_prompts_changed().await;
            }
        }

        ReloadReport {
            generation,
            outcome: ReloadOutcome::Applied,
            added,
            removed,
            tools: state.enabled_tools.len(),
            prompts: state.enabled_prompts.len(),
            prompts_changed,
        }
    }

    /// Register a fresh one-shot subscription that schedules the next reload.
    fn rearm(&self) {
        if self.is_closed() {
            return;
        }
        let controller = self.self_ref.clone();
        let runtime = self.runtime.clone();
        let watch = self.provider.watch_targets(Box::new(move || {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            runtime.spawn(async move {
                controller.reload_logged("targets changed").await;
            });
        }));
        *self.watch.lock() = Some(watch);
    }

    /// Only the most recently started pass reports its phase.
    fn set_phase(&self, generation: u64, phase: ReloadPhase) {
        let mut current = self.phase.lock();
        if generation == self.generation.load(Ordering::SeqCst) {
            *current = phase;
        }
    }
}

#[async_trait]
impl Reloadable for ReloadController {
    async fn reload(&self) -> McpResult<()> {
        ReloadController::reload(self).await.map(|_| ())
    }

    async fn reload_configuration(&self, config: ServerConfig) -> McpResult<()> {
        ReloadController::reload_configuration(self, config)
            .await
            .map(|_| ())
    }
}
