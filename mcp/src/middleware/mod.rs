//! Request interceptors wrapped around every `tools/call` and `prompts/get`.
//!
//! The standard chain runs, outermost first:
//! 1. [`SessionContext`]: session id and output settings into the call context
//! 2. [`TraceContextExtraction`]: W3C trace context from request `_meta`
//! 3. [`TracingSpan`]: one span per call, parented to the extracted context
//! 4. [`AuthorizationHeader`]: bearer credential into the call context
//! 5. [`CallLogging`]: tool name and arguments, then redacted headers
//! 6. [`RequestMetrics`]: duration and outcome per tool name
//! 7. [`ScopeAuthorization`]: `mcp:<tool>` scope gate, behind a feature flag

mod auth;
mod context;
mod logging;
mod metrics;
mod trace;

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::HeaderMap;
use rmcp::model::{CallToolResult, GetPromptResult, JsonObject};

pub use auth::ScopeAuthorization;
pub use context::{
    AuthorizationHeader, SessionContext, AUTHORIZATION_HEADER, LEGACY_AUTHORIZATION_HEADER,
    SESSION_ID_HEADER,
};
pub use logging::CallLogging;
pub use metrics::RequestMetrics;
pub use trace::{MetaCarrier, TraceContextExtraction, TracingSpan};

use crate::{
    core::{config::Configuration, config::ListOutput, metrics::McpMetrics},
    error::McpResult,
    provider::TargetProvider,
};

pub const METHOD_CALL_TOOL: &str = "tools/call";
pub const METHOD_GET_PROMPT: &str = "prompts/get";

/// Per-call values gathered by the middleware and visible to handlers.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub session_id: Option<String>,
    /// Raw credential from the authorization header, `Bearer ` prefix included.
    pub authorization: Option<String>,
    /// Identity confirmed by scope authorization, when it ran.
    pub identity: Option<String>,
    pub trace_context: Option<opentelemetry::Context>,
    pub list_output: ListOutput,
}

impl CallContext {
    /// The bearer token without its scheme prefix.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.authorization.as_deref()?.trim();
        let token = match value.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            // A bare scheme carries no credential.
            None if value.eq_ignore_ascii_case("bearer") => "",
            _ => value,
        };
        (!token.is_empty()).then_some(token)
    }
}

/// An inbound invocation as seen by the chain.
#[derive(Debug, Clone)]
pub struct McpRequest {
    /// Protocol method, `tools/call` or `prompts/get`.
    pub method: String,
    /// Tool or prompt name.
    pub name: String,
    pub arguments: JsonObject,
    /// Request `_meta`.
    pub meta: JsonObject,
    /// HTTP headers of the carrying request, empty for stdio.
    pub headers: HeaderMap,
    pub context: CallContext,
}

impl McpRequest {
    pub fn tool_call(name: impl Into<String>, arguments: JsonObject) -> Self {
        Self::new(METHOD_CALL_TOOL, name, arguments)
    }

    pub fn prompt_get(name: impl Into<String>, arguments: JsonObject) -> Self {
        Self::new(METHOD_GET_PROMPT, name, arguments)
    }

    fn new(method: &str, name: impl Into<String>, arguments: JsonObject) -> Self {
        Self {
            method: method.to_string(),
            name: name.into(),
            arguments,
            meta: JsonObject::new(),
            headers: HeaderMap::new(),
            context: CallContext::default(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: JsonObject) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn is_tool_call(&self) -> bool {
        self.method == METHOD_CALL_TOOL
    }

    /// Tool name for tool calls, otherwise the method.
    pub fn metric_name(&self) -> &str {
        if self.is_tool_call() {
            &self.name
        } else {
            &self.method
        }
    }
}

#[derive(Debug, Clone)]
pub enum McpResponse {
    Tool(CallToolResult),
    Prompt(GetPromptResult),
}

impl McpResponse {
    /// Whether the call reported failure through the tool-result error channel.
    pub fn is_error(&self) -> bool {
        match self {
            McpResponse::Tool(result) => result.is_error == Some(true),
            McpResponse::Prompt(_) => false,
        }
    }
}

/// Innermost handler the chain dispatches to.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, request: McpRequest) -> McpResult<McpResponse>;
}

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, request: McpRequest, next: Next<'_>) -> McpResult<McpResponse>;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub async fn run(self, request: McpRequest) -> McpResult<McpResponse> {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    endpoint: self.endpoint,
                };
                current.handle(request, next).await
            }
            None => self.endpoint.call(request).await,
        }
    }
}

#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard ordering. The scope gate is always installed and decides per
    /// call from the current configuration whether it applies.
    pub fn standard(
        configuration: Arc<ArcSwap<Configuration>>,
        provider: Arc<dyn TargetProvider>,
        metrics: Arc<McpMetrics>,
    ) -> Self {
        Self::new()
            .with(SessionContext::new(configuration.clone()))
            .with(TraceContextExtraction)
            .with(TracingSpan)
            .with(AuthorizationHeader)
            .with(CallLogging)
            .with(RequestMetrics::new(metrics))
            .with(ScopeAuthorization::new(configuration, provider))
    }

    #[must_use]
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub async fn dispatch(
        &self,
        request: McpRequest,
        endpoint: &dyn Endpoint,
    ) -> McpResult<McpResponse> {
        Next {
            middlewares: &self.middlewares,
            endpoint,
        }
        .run(request)
        .await
    }
}
