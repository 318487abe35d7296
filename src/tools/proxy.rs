//! Passthrough tools for another MCP server.
//!
//! This module implements `mcp_proxy_list_tools` and `mcp_proxy_call_tool`. They
//! never touch the local database.

use crate::error::DbResult;
use crate::mcp::upstream::UpstreamClient;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Input for the proxy list_tools tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProxyListToolsInput {
    /// Streamable HTTP endpoint of the upstream server, e.g. http://localhost:8001/mcp
    pub server_url: String,
}

/// Output from the proxy list_tools tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProxyListToolsOutput {
    /// Tool definitions as advertised upstream
    pub tools: Vec<JsonValue>,
}

/// Input for the proxy call_tool tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ProxyCallToolInput {
    /// Streamable HTTP endpoint of the upstream server
    pub server_url: String,
    /// Exact tool name on the upstream server
    pub tool_name: String,
    /// Arguments for that tool
    #[serde(default)]
    pub args: serde_json::Map<String, JsonValue>,
}

/// Output from the proxy call_tool tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProxyCallToolOutput {
    /// Structured content, `{"text": ...}` or `{"ok": true}`
    pub result: JsonValue,
}

/// Handler for passthrough tools.
pub struct ProxyToolHandler {
    timeout: Duration,
}

impl ProxyToolHandler {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn list_tools(&self, input: ProxyListToolsInput) -> DbResult<ProxyListToolsOutput> {
        let client = UpstreamClient::new(&input.server_url, self.timeout)?;
        let tools = client.list_tools().await?;
        Ok(ProxyListToolsOutput { tools })
    }

    pub async fn call_tool(&self, input: ProxyCallToolInput) -> DbResult<ProxyCallToolOutput> {
        let client = UpstreamClient::new(&input.server_url, self.timeout)?;
        let result = client.call_tool(&input.tool_name, input.args).await?;
        Ok(ProxyCallToolOutput { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_tool_args_default_to_empty() {
        let input: ProxyCallToolInput = serde_json::from_str(
            r#"{"server_url": "http://localhost:8001/mcp", "tool_name": "search"}"#,
        )
        .unwrap();
        assert!(input.args.is_empty());
    }

    #[tokio::test]
    async fn test_sse_url_rejected_before_connecting() {
        let handler = ProxyToolHandler::new(Duration::from_secs(1));
        let err = handler
            .list_tools(ProxyListToolsInput {
                server_url: "http://localhost:8001/sse".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
