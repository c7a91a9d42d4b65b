//! Session and credential context injection.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use http::HeaderMap;

use super::{McpRequest, McpResponse, Middleware, Next};
use crate::{core::config::Configuration, error::McpResult};

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Accepted when the standard header is absent.
pub const LEGACY_AUTHORIZATION_HEADER: &str = "kubernetes-authorization";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Copies the session id and current output settings into the call context.
pub struct SessionContext {
    configuration: Arc<ArcSwap<Configuration>>,
}

impl SessionContext {
    pub fn new(configuration: Arc<ArcSwap<Configuration>>) -> Self {
        Self { configuration }
    }
}

#[async_trait]
impl Middleware for SessionContext {
    fn name(&self) -> &'static str {
        "session_context"
    }

    async fn handle(&self, mut request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        if request.context.session_id.is_none() {
            request.context.session_id =
                header_str(&request.headers, SESSION_ID_HEADER).map(str::to_string);
        }
        request.context.list_output = self.configuration.load().config().list_output;
        next.run(request).await
    }
}

/// Propagates the caller's credential, preferring the standard header.
pub struct AuthorizationHeader;

#[async_trait]
impl Middleware for AuthorizationHeader {
    fn name(&self) -> &'static str {
        "authorization_header"
    }

    async fn handle(&self, mut request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        let credential = header_str(&request.headers, AUTHORIZATION_HEADER)
            .or_else(|| header_str(&request.headers, LEGACY_AUTHORIZATION_HEADER))
            .map(str::to_string);
        if credential.is_some() {
            request.context.authorization = credential;
        }
        next.run(request).await
    }
}
