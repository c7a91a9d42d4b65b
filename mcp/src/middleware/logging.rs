//! Call logging.

use async_trait::async_trait;
use http::HeaderMap;
use tracing::{debug, enabled, trace, Level};

use super::{McpRequest, McpResponse, Middleware, Next, AUTHORIZATION_HEADER};
use crate::error::McpResult;

/// Logs the call at `debug` and its headers at `trace`, never the `Authorization` header.
pub struct CallLogging;

/// `name: value` lines with the authorization header dropped.
pub(crate) fn redacted_headers(headers: &HeaderMap) -> Vec<String> {
    headers
        .iter()
        .filter(|(name, _)| !name.as_str().eq_ignore_ascii_case(AUTHORIZATION_HEADER))
        .map(|(name, value)| {
            format!(
                "{}: {}",
                name.as_str(),
                value.to_str().unwrap_or("<non-utf8>")
            )
        })
        .collect()
}

#[async_trait]
impl Middleware for CallLogging {
    fn name(&self) -> &'static str {
        "call_logging"
    }

    async fn handle(&self, request: McpRequest, next: Next<'_>) -> McpResult<McpResponse> {
        debug!(
            method = %request.method,
            name = %request.name,
            arguments = %serde_json::Value::Object(request.arguments.clone()),
            "MCP call"
        );
        if enabled!(Level::TRACE) && !request.headers.is_empty() {
            trace!(
                name = %request.name,
                headers = ?redacted_headers(&request.headers),
                "MCP call headers"
            );
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_authorization_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("mcp-session-id", HeaderValue::from_static("s-1"));
        headers.insert(
            "kubernetes-authorization",
            HeaderValue::from_static("Bearer legacy"),
        );

        let lines = redacted_headers(&headers);
        assert!(lines.iter().all(|line| !line.contains("secret")));
        assert!(lines.contains(&"mcp-session-id: s-1".to_string()));
        // Only the header literally named Authorization is dropped.
        assert!(lines
            .iter()
            .any(|line| line.starts_with("kubernetes-authorization")));
        assert_eq!(lines.len(), 2);
    }
}
