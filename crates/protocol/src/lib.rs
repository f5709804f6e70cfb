//! Agent wire protocols for Pistelink
//!
//! Request/response model, the shared error taxonomy, and the two transport
//! codecs (JSON-RPC 2.0 and MCP tool invocation) the data agents speak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::JsonRpcCodec;
pub use mcp::McpCodec;
pub use pistelink_config::Protocol;

use pistelink_config::{AgentEndpoint, AgentsConfig};

/// Agent communication errors
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    /// Bad input, rejected before any network activity
    #[error("invalid request: {0}")]
    Validation(String),

    /// The agent could not be reached or did not answer in time
    #[error("network timeout: {0}")]
    Timeout(String),

    /// The reply did not follow the wire protocol
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The agent answered with an error code
    #[error("agent error {code}: {message}")]
    Remote { code: i64, message: String },

    /// Both the live call and the cache came up empty
    #[error("{agent} unavailable after {attempts} attempts: {cause}")]
    Unavailable {
        agent: String,
        attempts: u32,
        cause: String,
    },
}

impl AgentError {
    /// Kind-based default classification; the retry engine consults its own
    /// configured code list on top of this.
    pub fn retryable(&self) -> bool {
        match self {
            AgentError::Timeout(_) => true,
            AgentError::Remote { code, .. } => default_retryable_code(*code),
            _ => false,
        }
    }

    /// Map a reqwest failure onto the taxonomy. Anything that kept us from
    /// getting a reply at all counts as a network timeout.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AgentError::Malformed(err.to_string())
        } else {
            AgentError::Timeout(err.to_string())
        }
    }
}

/// HTTP 5xx-equivalents, rate limiting, and JSON-RPC server errors
pub fn default_retryable_code(code: i64) -> bool {
    (500..=599).contains(&code) || (-32099..=-32000).contains(&code) || code == -32603 || code == 429
}

pub type Result<T> = std::result::Result<T, AgentError>;

/// The three data agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    HillMetrics,
    Weather,
    Equipment,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [
        AgentKind::HillMetrics,
        AgentKind::Weather,
        AgentKind::Equipment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::HillMetrics => "hill-metrics",
            AgentKind::Weather => "weather",
            AgentKind::Equipment => "equipment",
        }
    }

    /// Data method (JSON-RPC method name, MCP tool name)
    pub fn query_method(&self) -> &'static str {
        match self {
            AgentKind::HillMetrics => "terrain.query",
            AgentKind::Weather => "weather.query",
            AgentKind::Equipment => "equipment.query",
        }
    }

    /// Methods the agent is expected to advertise on capability discovery
    pub fn expected_methods(&self) -> Vec<String> {
        vec![self.query_method().to_string()]
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("unknown agent: {0} (expected hill-metrics, weather or equipment)")]
pub struct UnknownAgent(String);

impl FromStr for AgentKind {
    type Err = UnknownAgent;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hill-metrics" => Ok(AgentKind::HillMetrics),
            "weather" => Ok(AgentKind::Weather),
            "equipment" => Ok(AgentKind::Equipment),
            other => Err(UnknownAgent(other.to_string())),
        }
    }
}

/// Supported terrain grid resolutions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridSize {
    #[serde(rename = "32x32")]
    G32,
    #[serde(rename = "64x64")]
    G64,
    #[serde(rename = "96x96")]
    G96,
    #[serde(rename = "128x128")]
    G128,
}

impl GridSize {
    pub const ALL: [GridSize; 4] = [GridSize::G32, GridSize::G64, GridSize::G96, GridSize::G128];

    pub fn as_str(&self) -> &'static str {
        match self {
            GridSize::G32 => "32x32",
            GridSize::G64 => "64x64",
            GridSize::G96 => "96x96",
            GridSize::G128 => "128x128",
        }
    }
}

impl fmt::Display for GridSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("unsupported grid size: {0} (expected 32x32, 64x64, 96x96 or 128x128)")]
pub struct UnsupportedGridSize(String);

impl FromStr for GridSize {
    type Err = UnsupportedGridSize;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "32x32" => Ok(GridSize::G32),
            "64x64" => Ok(GridSize::G64),
            "96x96" => Ok(GridSize::G96),
            "128x128" => Ok(GridSize::G128),
            other => Err(UnsupportedGridSize(other.to_string())),
        }
    }
}

/// A point of the optional boundary polygon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Query parameters shared by all capabilities
#[derive(Debug, Clone)]
pub struct QueryParams {
    /// Geographic area identifier (run id for terrain queries)
    pub area_id: String,
    pub grid_size: Option<GridSize>,
    pub timestamp: Option<DateTime<Utc>>,
    pub boundary: Option<Vec<GeoPoint>>,
}

impl QueryParams {
    pub fn new(area_id: impl Into<String>) -> Self {
        Self {
            area_id: area_id.into(),
            grid_size: None,
            timestamp: None,
            boundary: None,
        }
    }

    /// Wire-level parameter object
    pub fn to_params(&self) -> Value {
        let mut params = json!({ "area": self.area_id });
        if let Some(grid) = self.grid_size {
            params["gridSize"] = json!(grid.as_str());
        }
        if let Some(timestamp) = self.timestamp {
            params["timestamp"] = json!(timestamp.to_rfc3339());
        }
        if let Some(boundary) = &self.boundary {
            params["boundary"] = json!(boundary);
        }
        params
    }
}

/// One capability call, immutable once built
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub agent: AgentKind,
    pub params: QueryParams,
    /// Overrides the agent's configured protocol for this call only
    pub protocol: Option<Protocol>,
    /// Overrides the endpoint timeout for this call only
    pub timeout_ms: Option<u64>,
}

impl AgentRequest {
    fn new(agent: AgentKind, params: QueryParams) -> Self {
        Self {
            agent,
            params,
            protocol: None,
            timeout_ms: None,
        }
    }

    /// Terrain grid for a run
    pub fn terrain(run_id: impl Into<String>, grid: GridSize) -> Self {
        let mut params = QueryParams::new(run_id);
        params.grid_size = Some(grid);
        Self::new(AgentKind::HillMetrics, params)
    }

    /// General hill metrics for an area, no grid
    pub fn hill_metrics(area_id: impl Into<String>) -> Self {
        Self::new(AgentKind::HillMetrics, QueryParams::new(area_id))
    }

    pub fn weather(area_id: impl Into<String>) -> Self {
        Self::new(AgentKind::Weather, QueryParams::new(area_id))
    }

    pub fn equipment(area_id: impl Into<String>) -> Self {
        Self::new(AgentKind::Equipment, QueryParams::new(area_id))
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.params.timestamp = Some(timestamp);
        self
    }

    pub fn with_boundary(mut self, boundary: Vec<GeoPoint>) -> Self {
        self.params.boundary = Some(boundary);
        self
    }

    pub fn method(&self) -> &'static str {
        self.agent.query_method()
    }
}

/// Response metadata
#[derive(Debug, Clone, Serialize)]
pub struct ResponseMeta {
    pub elapsed_ms: u64,
    /// Agent name and endpoint the payload came from
    pub source: String,
    /// Freshness tag lifted from the payload when the agent provides one
    pub freshness: Option<String>,
}

/// Decoded capability payload
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub payload: Value,
    pub meta: ResponseMeta,
}

impl AgentResponse {
    pub fn new(payload: Value, elapsed_ms: u64, source: impl Into<String>) -> Self {
        let freshness = payload
            .get("freshness")
            .and_then(|v| v.as_str())
            .map(String::from);
        Self {
            payload,
            meta: ResponseMeta {
                elapsed_ms,
                source: source.into(),
                freshness,
            },
        }
    }
}

/// What a health probe learned about the agent's capability surface
#[derive(Debug, Clone)]
pub struct ProbeReply {
    /// `Some` from MCP discovery, `None` from a plain JSON-RPC ping
    pub methods: Option<Vec<String>>,
}

/// Protocol-selected codec, fixed at construction
///
/// One variant per wire protocol; callers never branch on the protocol
/// themselves.
pub enum AgentTransport {
    JsonRpc(JsonRpcCodec),
    Mcp(McpCodec),
}

impl AgentTransport {
    pub fn from_endpoint(agent: AgentKind, endpoint: &AgentEndpoint) -> Self {
        Self::with_protocol(agent, endpoint, endpoint.protocol)
    }

    pub fn with_protocol(agent: AgentKind, endpoint: &AgentEndpoint, protocol: Protocol) -> Self {
        match protocol {
            Protocol::JsonRpc => AgentTransport::JsonRpc(JsonRpcCodec::new(agent, endpoint.url())),
            Protocol::Mcp => AgentTransport::Mcp(McpCodec::new(agent, endpoint.url())),
        }
    }

    /// Issue a capability call
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        match self {
            AgentTransport::JsonRpc(codec) => codec.call(method, params, timeout).await,
            AgentTransport::Mcp(codec) => codec.call_tool(method, params, timeout).await,
        }
    }

    /// Lightweight reachability probe
    pub async fn probe(&self, timeout: Duration) -> Result<ProbeReply> {
        match self {
            AgentTransport::JsonRpc(codec) => {
                codec.ping(timeout).await?;
                Ok(ProbeReply { methods: None })
            }
            AgentTransport::Mcp(codec) => {
                let methods = codec.list_tools(timeout).await?;
                Ok(ProbeReply {
                    methods: Some(methods),
                })
            }
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            AgentTransport::JsonRpc(_) => Protocol::JsonRpc,
            AgentTransport::Mcp(_) => Protocol::Mcp,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            AgentTransport::JsonRpc(codec) => codec.url(),
            AgentTransport::Mcp(codec) => codec.url(),
        }
    }

    pub fn agent(&self) -> AgentKind {
        match self {
            AgentTransport::JsonRpc(codec) => codec.agent(),
            AgentTransport::Mcp(codec) => codec.agent(),
        }
    }
}

/// One transport per configured agent
pub struct TransportSet {
    hill_metrics: AgentTransport,
    weather: AgentTransport,
    equipment: AgentTransport,
}

impl TransportSet {
    pub fn from_config(agents: &AgentsConfig) -> Self {
        Self {
            hill_metrics: AgentTransport::from_endpoint(AgentKind::HillMetrics, &agents.hill_metrics),
            weather: AgentTransport::from_endpoint(AgentKind::Weather, &agents.weather),
            equipment: AgentTransport::from_endpoint(AgentKind::Equipment, &agents.equipment),
        }
    }

    pub fn get(&self, agent: AgentKind) -> &AgentTransport {
        match agent {
            AgentKind::HillMetrics => &self.hill_metrics,
            AgentKind::Weather => &self.weather,
            AgentKind::Equipment => &self.equipment,
        }
    }
}

/// Endpoint lookup mirroring [`TransportSet::get`]
pub fn endpoint_for<'a>(agents: &'a AgentsConfig, agent: AgentKind) -> &'a AgentEndpoint {
    match agent {
        AgentKind::HillMetrics => &agents.hill_metrics,
        AgentKind::Weather => &agents.weather,
        AgentKind::Equipment => &agents.equipment,
    }
}
