//! Scope-based authorization for tool calls.
//!
//! Experimental: runs only when both `require_oauth` and
//! `experimental_scope_authorization` are set. The required scope for a tool is
//! `mcp:<tool name>`; prompts are not gated.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{McpRequest, McpResponse, Middleware, Next};
use crate::{
    core::config::Configuration,
    error::{McpError, McpResult},
    provider::TargetProvider,
};

pub const SCOPE_PREFIX: &str = "mcp:";

pub struct ScopeAuthorization {
    configuration: Arc<ArcSwap<Configuration>>,
    provider: Arc<dyn TargetProvider>,
}

impl ScopeAuthorization {
    pub fn new(
        configuration: Arc<ArcSwap<Configuration>>,
        provider: Arc<dyn TargetProvider>,
    ) -> Self {
        Self {
            configuration,
            provider,
        }
    }

    pub fn required_scope(tool_name: &str) -> String {
        format!("{SCOPE_PREFIX}{tool_name}")
    }
}

#[async_trait]
impl Middleware for ScopeAuthorization {
    fn name(&self) -> &'static str {
        "scope_authorization"
    }

    async fn handle(&self, mut request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        let configuration = self.configuration.load_full();
        let config = configuration.config();
        if !config.scope_authorization_enabled() || !request.is_tool_call() {
            return next.run(request).await;
        }

        let token = request
            .context
            .bearer_token()
            .ok_or_else(|| McpError::Auth("missing bearer token".to_string()))?
            .to_string();

        let parameter = self.provider.target_parameter_name();
        let target = request
            .arguments
            .get(&parameter)
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.provider.default_target());

        let verified = self
            .provider
            .verify_token(&target, &token, config.oauth_audience.as_deref())
            .await?;

        let scope = Self::required_scope(&request.name);
        if !verified.has_scope(&scope) {
            warn!(
                tool = %request.name,
                identity = %verified.identity,
                required_scope = %scope,
                "Tool call rejected: missing scope"
            );
            return Err(McpError::Forbidden(format!(
                "token lacks required scope '{scope}'"
            )));
        }

        debug!(tool = %request.name, identity = %verified.identity, "Scope check passed");
        request.context.identity = Some(verified.identity);
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use rmcp::model::{CallToolResult, Content, JsonObject};

    use super::*;
    use crate::{
        core::config::ServerConfig,
        middleware::{Endpoint, MiddlewareChain},
        provider::MockTargetProvider,
    };

    struct Identity;

    #[async_trait]
    impl Endpoint for Identity {
        async fn call(&self, request: McpRequest) -> McpResult<McpResponse> {
            let identity = request.context.identity.unwrap_or_default();
            Ok(McpResponse::Tool(CallToolResult::success(vec![
                Content::text(identity),
            ])))
        }
    }

    fn chain(enabled: bool, provider: &MockTargetProvider) -> MiddlewareChain {
        let config = ServerConfig {
            require_oauth: true,
            experimental_scope_authorization: enabled,
            ..Default::default()
        };
        MiddlewareChain::new().with(ScopeAuthorization::new(
            Arc::new(ArcSwap::from_pointee(Configuration::new(config))),
            Arc::new(provider.clone()),
        ))
    }

    fn call(authorization: Option<&str>) -> McpRequest {
        let mut request = McpRequest::tool_call("pods_list", JsonObject::new());
        request.context.authorization = authorization.map(str::to_string);
        request
    }

    #[tokio::test]
    async fn test_disabled_gate_passes_through() {
        let provider = MockTargetProvider::new(&["a"], "a");
        let result = chain(false, &provider).dispatch(call(None), &Identity).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let provider = MockTargetProvider::new(&["a"], "a");
        let err = chain(true, &provider)
            .dispatch(call(None), &Identity)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Auth(_)));
    }

    #[tokio::test]
    async fn test_scope_required() {
        let provider = MockTargetProvider::new(&["a"], "a");
        let err = chain(true, &provider)
            .dispatch(call(Some("Bearer alice")), &Identity)
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Forbidden(_)));

        provider.set_scopes(&["mcp:pods_list"]);
        let ok = chain(true, &provider)
            .dispatch(call(Some("Bearer alice")), &Identity)
            .await
            .unwrap();
        match ok {
            McpResponse::Tool(result) => {
                assert_eq!(result.content[0].as_text().unwrap().text, "alice");
            }
            McpResponse::Prompt(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_prompts_not_gated() {
        let provider = MockTargetProvider::new(&["a"], "a");
        let request = McpRequest::prompt_get("cluster-health-check", JsonObject::new());
        let result = chain(true, &provider).dispatch(request, &Identity).await;
        assert!(result.is_ok());
    }
}
