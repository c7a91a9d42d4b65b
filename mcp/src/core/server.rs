//! The running registry server.
//!
//! [`McpServer`] owns one configuration, one provider and the registry state. It
//! performs the initial reload on construction, hosts the watcher tasks and routes
//! calls through the middleware chain to the registered handlers.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use rmcp::{
    model::{CallToolResult, Content, GetPromptResult},
    service::Peer,
    RoleServer,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    config::{Configuration, ServerConfig},
    metrics::McpMetrics,
    reload::{ReloadController, ReloadReport},
    session::{PeerId, SessionRegistry},
};
use crate::{
    error::{McpError, McpResult},
    inventory::{PromptRequest, ToolRequest, ToolsetRegistry},
    middleware::{Endpoint, McpRequest, McpResponse, MiddlewareChain},
    provider::TargetProvider,
    watch::{CapabilitySource, ConfigLoader, ConfigWatcher, Reloadable, TopologyPoller},
};

/// How often a tracked session is checked for a closed transport.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Runs after the provider is released on [`McpServer::close`].
pub type CloseHook = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    name: String,
    version: String,
    instructions: Option<String>,
    configuration: Arc<ArcSwap<Configuration>>,
    provider: Arc<dyn TargetProvider>,
    sessions: Arc<SessionRegistry>,
    metrics: Arc<McpMetrics>,
    controller: Arc<ReloadController>,
    middleware: MiddlewareChain,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    close_hooks: Mutex<Vec<CloseHook>>,
    closed: AtomicBool,
}

pub struct McpServerBuilder {
    config: ServerConfig,
    provider: Arc<dyn TargetProvider>,
    toolsets: Arc<ToolsetRegistry>,
    name: String,
    version: String,
    instructions: Option<String>,
    metrics: Option<Arc<McpMetrics>>,
}

impl McpServerBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<McpMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and run the initial reload. Any failure is fatal.
    pub async fn build(self) -> McpResult<McpServer> {
        self.config.validate()?;
        let configuration = Configuration::new(self.config);
        configuration.toolsets(&self.toolsets)?;
        let configuration = Arc::new(ArcSwap::from_pointee(configuration));

        let sessions = Arc::new(SessionRegistry::new());
        let metrics = self.metrics.unwrap_or_default();
        let controller = ReloadController::new(
            configuration.clone(),
            self.provider.clone(),
            self.toolsets,
            sessions.clone(),
            metrics.clone(),
        )?;
        let middleware =
            MiddlewareChain::standard(configuration.clone(), self.provider.clone(), metrics.clone());

        let report = controller.reload().await?;
        info!(
            tools = report.tools,
            prompts = report.prompts,
            "MCP registry initialized"
        );

        Ok(McpServer {
            inner: Arc::new(ServerInner {
                name: self.name,
                version: self.version,
                instructions: self.instructions,
                configuration,
                provider: self.provider,
                sessions,
                metrics,
                controller,
                middleware,
                tasks: Mutex::new(Vec::new()),
                close_hooks: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }
}

impl McpServer {
    pub fn builder(
        config: ServerConfig,
        provider: Arc<dyn TargetProvider>,
        toolsets: Arc<ToolsetRegistry>,
    ) -> McpServerBuilder {
        McpServerBuilder {
            config,
            provider,
            toolsets,
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            metrics: None,
        }
    }

    /// Build with default identity and run the initial reload.
    pub async fn new(
        config: ServerConfig,
        provider: Arc<dyn TargetProvider>,
        toolsets: Arc<ToolsetRegistry>,
    ) -> McpResult<Self> {
        Self::builder(config, provider, toolsets).build().await
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn instructions(&self) -> Option<&str> {
        self.inner.instructions.as_deref()
    }

    pub fn configuration(&self) -> Arc<Configuration> {
        self.inner.configuration.load_full()
    }

    pub fn provider(&self) -> &Arc<dyn TargetProvider> {
        &self.inner.provider
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.inner.sessions
    }

    pub fn metrics(&self) -> &Arc<McpMetrics> {
        &self.inner.metrics
    }

    pub fn controller(&self) -> &Arc<ReloadController> {
        &self.inner.controller
    }

    pub fn is_stateless(&self) -> bool {
        self.configuration().config().stateless
    }

    /// Tool names enabled by the last committed reload.
    pub fn enabled_tools(&self) -> BTreeSet<String> {
        self.inner.controller.snapshot().tools.clone()
    }

    /// Prompt names enabled by the last committed reload.
    pub fn enabled_prompts(&self) -> BTreeSet<String> {
        self.inner.controller.snapshot().prompts.clone()
    }

    pub async fn reload(&self) -> McpResult<ReloadReport> {
        self.inner.controller.reload().await
    }

    pub async fn reload_configuration(&self, config: ServerConfig) -> McpResult<ReloadReport> {
        self.inner.controller.reload_configuration(config).await
    }

    /// Run a `tools/call` through the middleware chain.
    ///
    /// Handler failures come back as an error result; only middleware rejections
    /// and unknown tools are `Err`.
    pub async fn call_tool(&self, request: McpRequest) -> McpResult<CallToolResult> {
        let endpoint = RegistryEndpoint {
            sessions: &self.inner.sessions,
        };
        match self.inner.middleware.dispatch(request, &endpoint).await? {
            McpResponse::Tool(result) => Ok(result),
            McpResponse::Prompt(_) => Err(McpError::InvalidArguments(
                "prompt response to a tool call".to_string(),
            )),
        }
    }

    /// Run a `prompts/get` through the middleware chain.
    pub async fn get_prompt(&self, request: McpRequest) -> McpResult<GetPromptResult> {
        let endpoint = RegistryEndpoint {
            sessions: &self.inner.sessions,
        };
        match self.inner.middleware.dispatch(request, &endpoint).await? {
            McpResponse::Prompt(result) => Ok(result),
            McpResponse::Tool(_) => Err(McpError::InvalidArguments(
                "tool response to a prompt request".to_string(),
            )),
        }
    }

    /// Reload the registry when the configuration file changes.
    pub fn spawn_config_watcher(
        &self,
        path: impl Into<PathBuf>,
        loader: ConfigLoader,
    ) -> McpResult<()> {
        let window = Duration::from_millis(self.configuration().config().watch.debounce_ms);
        let handle = ConfigWatcher::new(path, window, loader).spawn(self.reload_target())?;
        self.inner.tasks.lock().push(handle);
        Ok(())
    }

    /// Reload the registry when the source's fingerprint changes.
    pub fn spawn_topology_poller(&self, source: Arc<dyn CapabilitySource>) {
        let watch = self.configuration().config().watch;
        let handle = TopologyPoller::new(
            source,
            Duration::from_millis(watch.poll_interval_ms),
            Duration::from_millis(watch.debounce_ms),
        )
        .spawn(self.reload_target());
        self.inner.tasks.lock().push(handle);
    }

    /// Track an initialized stateful session until its transport closes.
    pub(crate) fn track_session(&self, peer: Peer<RoleServer>) -> PeerId {
        let sessions = self.inner.sessions.clone();
        let id = sessions.add_peer(peer.clone());
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(SESSION_CHECK_INTERVAL);
            loop {
                ticks.tick().await;
                if !sessions.contains_peer(id) {
                    break;
                }
                if peer.is_transport_closed() {
                    sessions.remove_peer(id);
                    break;
                }
            }
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        id
    }

    /// Register work to run at the end of [`McpServer::close`], e.g. a metrics flush.
    pub fn on_close(&self, hook: impl FnOnce() + Send + 'static) {
        self.inner.close_hooks.lock().push(Box::new(hook));
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Deregister watches, stop watcher tasks, release the provider, then run close hooks.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.controller.close();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            task.abort();
        }

        self.inner.provider.close().await;

        let hooks: Vec<CloseHook> = std::mem::take(&mut *self.inner.close_hooks.lock());
        for hook in hooks {
            hook();
        }
        info!("MCP server closed");
    }

    fn reload_target(&self) -> Weak<dyn Reloadable> {
        let controller: Arc<dyn Reloadable> = self.inner.controller.clone();
        Arc::downgrade(&controller)
    }
}

/// Dispatches to the handlers currently registered with the session layer.
struct RegistryEndpoint<'a> {
    sessions: &'a SessionRegistry,
}

#[async_trait]
impl Endpoint for RegistryEndpoint<'_> {
    async fn call(&self, request: McpRequest) -> McpResult<McpResponse> {
        if request.is_tool_call() {
            let tool = self
                .sessions
                .tool(&request.name)
                .ok_or_else(|| McpError::ToolNotFound(request.name.clone()))?;
            let tool_request = ToolRequest {
                name: request.name,
                arguments: request.arguments,
                context: request.context,
            };
            let result = match tool.handler.call(tool_request).await {
                Ok(result) => result,
                Err(e) => {
                    debug!(tool = %tool.name(), error = %e, "Tool returned an error");
                    CallToolResult::error(vec![Content::text(e.to_string())])
                }
            };
            Ok(McpResponse::Tool(result))
        } else {
            let prompt = self
                .sessions
                .prompt(&request.name)
                .ok_or_else(|| McpError::PromptNotFound(request.name.clone()))?;
            let prompt_request = PromptRequest {
                name: request.name,
                arguments: request.arguments,
                context: request.context,
            };
            match prompt.handler.get(prompt_request).await {
                Ok(result) => Ok(McpResponse::Prompt(result)),
                Err(e) => {
                    warn!(prompt = %prompt.name(), error = %e, "Prompt rendering failed");
                    Err(e)
                }
            }
        }
    }
}
