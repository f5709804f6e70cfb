//! JSON-RPC 2.0 codec
//!
//! Builds `{jsonrpc, method, params, id}` envelopes over HTTP POST and
//! interprets the reply, correlating it to the request by id.

use crate::{AgentError, AgentKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::trace;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC codec for one agent endpoint
pub struct JsonRpcCodec {
    agent: AgentKind,
    url: String,
    client: reqwest::Client,
}

impl JsonRpcCodec {
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

    /// Issue a data call and return the `result` payload
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        exchange(&self.client, &self.url, self.agent, method, params, timeout).await
    }

    /// Reachability probe; agents answer `ping` with an empty result
    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        self.call("ping", json!({}), timeout).await.map(|_| ())
    }
}

/// Send one envelope and interpret the reply. Shared with the MCP codec,
/// which frames its tool invocations as JSON-RPC as well.
pub(crate) async fn exchange(
    client: &reqwest::Client,
    url: &str,
    agent: AgentKind,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value> {
    let id = Uuid::new_v4().to_string();
    let request = JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id: Value::String(id.clone()),
        method: method.to_string(),
        params: Some(params),
    };

    trace!(agent = %agent, method, id = %id, "issuing request");

    let response = client
        .post(url)
        .timeout(timeout)
        .json(&request)
        .send()
        .await
        .map_err(AgentError::from_transport)?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(AgentError::from_transport)?;

    interpret_reply(&id, status, &body)
}

/// Decode a reply body against the correlation id we sent.
///
/// An `error` object wins over everything else (its id may legitimately be
/// null); after that the id must echo ours and a `result` must be present.
fn interpret_reply(expected_id: &str, status: u16, body: &str) -> Result<Value> {
    let reply: JsonRpcResponse = match serde_json::from_str(body) {
        Ok(reply) => reply,
        Err(err) => {
            if !(200..300).contains(&status) {
                return Err(AgentError::Remote {
                    code: status as i64,
                    message: format!("http status {status}"),
                });
            }
            return Err(AgentError::Malformed(format!("unparseable reply body: {err}")));
        }
    };

    if let Some(error) = reply.error {
        return Err(AgentError::Remote {
            code: error.code,
            message: error.message,
        });
    }

    if reply.id.as_str() != Some(expected_id) {
        return Err(AgentError::Malformed(format!(
            "correlation id mismatch: sent {expected_id}, got {}",
            reply.id
        )));
    }

    reply
        .result
        .ok_or_else(|| AgentError::Malformed("reply carries neither result nor error".to_string()))
}
