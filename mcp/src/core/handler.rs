//! RMCP `ServerHandler` for [`McpServer`].
//!
//! Listing reads the committed registry directly. `tools/call` and `prompts/get`
//! are turned into [`McpRequest`]s and dispatched through the middleware chain.

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, GetPromptRequestParam, GetPromptResult,
        Implementation, ListPromptsResult, ListToolsResult, PaginatedRequestParam,
        ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::{NotificationContext, RequestContext},
    ErrorData, RoleServer, ServerHandler,
};
use tracing::debug;

use super::server::McpServer;
use crate::{error::McpError, middleware::McpRequest};

impl From<McpError> for ErrorData {
    fn from(err: McpError) -> Self {
        let message = err.to_string();
        match err {
            McpError::ToolNotFound(_)
            | McpError::PromptNotFound(_)
            | McpError::InvalidArguments(_) => ErrorData::invalid_params(message, None),
            McpError::Auth(_) | McpError::Forbidden(_) => ErrorData::invalid_request(message, None),
            _ => ErrorData::internal_error(message, None),
        }
    }
}

/// Carry `_meta` and, over HTTP, the request headers into the chain.
fn with_transport(request: McpRequest, context: &RequestContext<RoleServer>) -> McpRequest {
    let request = request.with_meta(context.meta.0.clone());
    match context.extensions.get::<http::request::Parts>() {
        Some(parts) => request.with_headers(parts.headers.clone()),
        None => request,
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_tool_list_changed()
                .enable_prompts()
                .enable_prompts_list_changed()
                .build(),
            server_info: Implementation {
                name: self.name().to_string(),
                version: self.version().to_string(),
                ..Default::default()
            },
            instructions: self.instructions().map(str::to_string),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .sessions()
            .tools()
            .into_iter()
            .map(|tool| tool.tool)
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let call = McpRequest::tool_call(request.name, request.arguments.unwrap_or_default());
        let call = with_transport(call, &context);
        McpServer::call_tool(self, call).await.map_err(ErrorData::from)
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        let prompts = self
            .sessions()
            .prompts()
            .into_iter()
            .map(|prompt| prompt.prompt)
            .collect();
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        let get = McpRequest::prompt_get(request.name, request.arguments.unwrap_or_default());
        let get = with_transport(get, &context);
        McpServer::get_prompt(self, get).await.map_err(ErrorData::from)
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        if self.is_stateless() {
            return;
        }
        let peer_id = self.track_session(context.peer.clone());
        debug!(peer_id, "Client initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let not_found: ErrorData = McpError::ToolNotFound("pods_get".to_string()).into();
        assert_eq!(not_found.code, ErrorData::invalid_params("", None).code);

        let forbidden: ErrorData = McpError::Forbidden("missing scope".to_string()).into();
        assert_eq!(forbidden.code, ErrorData::invalid_request("", None).code);

        let closed: ErrorData = McpError::Closed.into();
        assert_eq!(closed.code, ErrorData::internal_error("", None).code);
        assert!(closed.message.contains("closed"));
    }
}
