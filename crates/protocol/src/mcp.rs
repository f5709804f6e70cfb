//! MCP codec
//!
//! Expresses capability calls as `tools/call` invocations and exposes
//! `tools/list` capability discovery for the health monitor. MCP frames its
//! messages as JSON-RPC, so the envelope exchange is shared with the
//! JSON-RPC codec.

use crate::jsonrpc::exchange;
use crate::{AgentError, AgentKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Remote code reported for tool-level execution failures
pub const TOOL_ERROR_CODE: i64 = -32000;

/// `tools/call` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallReply {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: Option<bool>,
}

/// One content item of a tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    Resource {
        resource: ResourceContent,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    pub uri: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// `tools/list` result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsReply {
    pub tools: Vec<ToolInfo>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// MCP codec for one agent endpoint
pub struct McpCodec {
    agent: AgentKind,
    url: String,
    client: reqwest::Client,
}

impl McpCodec {
    pub fn new(agent: AgentKind, url: impl Into<String>) -> Self {
        Self {
            agent,
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke a tool and decode its text content as the JSON payload
    pub async fn call_tool(&self, tool: &str, arguments: Value, timeout: Duration) -> Result<Value> {
        let params = json!({ "name": tool, "arguments": arguments });
        let result = exchange(&self.client, &self.url, self.agent, "tools/call", params, timeout).await?;

        let reply: ToolCallReply = serde_json::from_value(result)
            .map_err(|err| AgentError::Malformed(format!("invalid tools/call result: {err}")))?;

        let text = reply
            .content
            .iter()
            .filter_map(|item| match item {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Resource { resource } => resource.text.as_deref(),
                ToolContent::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if reply.is_error.unwrap_or(false) {
            debug!(agent = %self.agent, tool, "tool returned error");
            return Err(AgentError::Remote {
                code: TOOL_ERROR_CODE,
                message: text,
            });
        }

        serde_json::from_str(&text)
            .map_err(|err| AgentError::Malformed(format!("tool result is not valid json: {err}")))
    }

    /// Capability discovery; follows pagination cursors until exhausted
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result =
                exchange(&self.client, &self.url, self.agent, "tools/list", params, timeout).await?;

            let reply: ListToolsReply = serde_json::from_value(result)
                .map_err(|err| AgentError::Malformed(format!("invalid tools/list result: {err}")))?;

            names.extend(reply.tools.into_iter().map(|tool| tool.name));

            if reply.next_cursor.is_none() {
                break;
            }
            cursor = reply.next_cursor;
        }

        debug!(agent = %self.agent, count = names.len(), "listed tools");
        Ok(names)
    }
}
