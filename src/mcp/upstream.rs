//! Client side of the passthrough tools.
//!
//! Each call opens a streamable HTTP session to the upstream server, performs one
//! request and cancels the session. Nothing is cached between calls.

use crate::error::{DbError, DbResult};
use rmcp::model::{CallToolRequestParam, CallToolResult};
use rmcp::service::{RoleClient, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use serde_json::{Value as JsonValue, json};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

type UpstreamSession = RunningService<RoleClient, ()>;

/// Check an upstream URL before any network traffic.
///
/// Only http and https are accepted. A path ending in `/sse` names the legacy
/// SSE transport, which this client does not speak.
pub fn parse_server_url(raw: &str) -> DbResult<Url> {
    let raw = raw.trim();
    let url = Url::parse(raw)
        .map_err(|e| DbError::invalid_input(format!("Invalid server_url '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DbError::invalid_input(format!(
            "server_url must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.path().trim_end_matches('/').ends_with("/sse") {
        return Err(DbError::invalid_input(
            "The legacy SSE transport is not supported; use the server's streamable HTTP endpoint (usually /mcp)",
        ));
    }
    Ok(url)
}

/// Reduce a tool result to one JSON value: structured content, else the first
/// text block as `{"text": ...}`, else `{"ok": true}`.
pub fn simplify_result(url: &str, result: CallToolResult) -> DbResult<JsonValue> {
    let text = result
        .content
        .first()
        .and_then(|c| c.as_text())
        .map(|t| t.text.clone());

    if result.is_error == Some(true) {
        let message = text.unwrap_or_else(|| "tool reported an error".to_string());
        return Err(DbError::upstream(url, message));
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }
    Ok(match text {
        Some(text) => json!({ "text": text }),
        None => json!({ "ok": true }),
    })
}

/// Thin client for one upstream MCP server.
pub struct UpstreamClient {
    url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(server_url: &str, timeout: Duration) -> DbResult<Self> {
        Ok(Self {
            url: parse_server_url(server_url)?,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// List every tool the upstream server advertises, as plain JSON.
    pub async fn list_tools(&self) -> DbResult<Vec<JsonValue>> {
        let work = async {
            let session = self.connect().await?;
            let tools = session
                .list_all_tools()
                .await
                .map_err(|e| DbError::upstream(self.url(), e.to_string()));
            self.close(session).await;
            tools
        };
        let tools = self.with_deadline("list_tools", work).await?;

        info!(url = %self.url, count = tools.len(), "Listed upstream tools");
        tools
            .into_iter()
            .map(|t| {
                serde_json::to_value(t)
                    .map_err(|e| DbError::internal(format!("Failed to encode tool: {}", e)))
            })
            .collect()
    }

    /// Call `tool_name` with `args` and simplify the result.
    pub async fn call_tool(
        &self,
        tool_name: &str,
        args: serde_json::Map<String, JsonValue>,
    ) -> DbResult<JsonValue> {
        let tool_name = tool_name.trim();
        if tool_name.is_empty() {
            return Err(DbError::invalid_input("tool_name must not be empty"));
        }
        let request: CallToolRequestParam =
            serde_json::from_value(json!({ "name": tool_name, "arguments": args }))
                .map_err(|e| DbError::internal(format!("Failed to build tool call: {}", e)))?;

        let work = async {
            let session = self.connect().await?;
            let result = session
                .call_tool(request)
                .await
                .map_err(|e| DbError::upstream(self.url(), e.to_string()));
            self.close(session).await;
            result
        };
        let result = self.with_deadline("call_tool", work).await?;

        info!(url = %self.url, tool = tool_name, "Called upstream tool");
        simplify_result(self.url(), result)
    }

    async fn connect(&self) -> DbResult<UpstreamSession> {
        let transport = StreamableHttpClientTransport::from_uri(self.url.as_str());
        ().serve(transport)
            .await
            .map_err(|e| DbError::upstream(self.url(), format!("initialize failed: {}", e)))
    }

    async fn close(&self, session: UpstreamSession) {
        if let Err(e) = session.cancel().await {
            debug!(url = %self.url, error = %e, "Upstream session did not shut down cleanly");
        }
    }

    /// Bound a whole upstream exchange, handshake included.
    async fn with_deadline<T>(
        &self,
        operation: &str,
        work: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| DbError::timeout(format!("upstream {}", operation), self.timeout.as_secs()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;

    #[test]
    fn test_parse_server_url() {
        assert!(parse_server_url("http://localhost:8001/mcp").is_ok());
        assert!(parse_server_url(" https://example.com/mcp/ ").is_ok());
        assert!(parse_server_url("localhost:8001").is_err());
        assert!(parse_server_url("ftp://example.com/mcp").is_err());
        assert!(parse_server_url("not a url").is_err());
    }

    #[test]
    fn test_sse_endpoint_rejected() {
        let err = parse_server_url("http://localhost:8001/sse").unwrap_err();
        assert!(err.to_string().contains("SSE"), "{}", err);
        assert!(parse_server_url("http://localhost:8001/sse/").is_err());
    }

    #[test]
    fn test_simplify_prefers_structured_content() {
        let result = CallToolResult::structured(json!({"n": 3}));
        assert_eq!(simplify_result("u", result).unwrap(), json!({"n": 3}));
    }

    #[test]
    fn test_simplify_text_and_empty() {
        let result = CallToolResult::success(vec![Content::text("hello")]);
        assert_eq!(simplify_result("u", result).unwrap(), json!({"text": "hello"}));

        let result = CallToolResult::success(vec![]);
        assert_eq!(simplify_result("u", result).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_simplify_error_result() {
        let result = CallToolResult::error(vec![Content::text("boom")]);
        let err = simplify_result("http://x/mcp", result).unwrap_err();
        assert!(matches!(err, DbError::Upstream { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let client = UpstreamClient::new("http://127.0.0.1:9/mcp", Duration::from_secs(5)).unwrap();
        assert!(client.list_tools().await.is_err());
    }
}
