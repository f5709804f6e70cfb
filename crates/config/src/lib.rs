//! Configuration management for Pistelink
//!
//! Handles loading and saving agent endpoints, retry, cache, and health
//! parameters from the local config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;

pub use paths::{cache_dir, config_path, data_dir};

/// Errors in configuration handling
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config not found: {0}")]
    NotFound(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Wire protocol an agent speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    /// JSON-RPC 2.0 over HTTP POST
    #[default]
    JsonRpc,
    /// MCP tool invocation (JSON-RPC framed) over HTTP POST
    Mcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::JsonRpc => "json-rpc",
            Protocol::Mcp => "mcp",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One agent's network endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEndpoint {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_rpc_path")]
    pub path: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl AgentEndpoint {
    /// Endpoint with defaults for everything but the port
    pub fn on_port(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            path: default_rpc_path(),
            protocol: Protocol::default(),
            timeout_ms: default_timeout_ms(),
        }
    }

    /// Full request URL
    pub fn url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, self.path)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_path() -> String {
    "/rpc".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Endpoints for the three data agents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_hill_metrics_endpoint")]
    pub hill_metrics: AgentEndpoint,
    #[serde(default = "default_weather_endpoint")]
    pub weather: AgentEndpoint,
    #[serde(default = "default_equipment_endpoint")]
    pub equipment: AgentEndpoint,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            hill_metrics: default_hill_metrics_endpoint(),
            weather: default_weather_endpoint(),
            equipment: default_equipment_endpoint(),
        }
    }
}

fn default_hill_metrics_endpoint() -> AgentEndpoint {
    AgentEndpoint::on_port(8081)
}

fn default_weather_endpoint() -> AgentEndpoint {
    AgentEndpoint::on_port(8082)
}

fn default_equipment_endpoint() -> AgentEndpoint {
    AgentEndpoint::on_port(8083)
}

/// Retry and backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Remote error codes considered transient
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<i64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_retryable_codes() -> Vec<i64> {
    vec![-32603, -32000, 429, 500, 502, 503, 504]
}

/// Cache TTLs and maintenance parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Terrain grid entries (seconds)
    #[serde(default = "default_terrain_ttl_s")]
    pub terrain_ttl_s: u64,
    /// Raw agent responses (seconds)
    #[serde(default = "default_agent_ttl_s")]
    pub agent_ttl_s: u64,
    /// Run definitions (seconds)
    #[serde(default = "default_run_ttl_s")]
    pub run_ttl_s: u64,
    /// Soft cap used for maintenance warnings, not eviction
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Schema version tag; bumping it invalidates every stored entry
    #[serde(default = "default_cache_version")]
    pub version: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            terrain_ttl_s: default_terrain_ttl_s(),
            agent_ttl_s: default_agent_ttl_s(),
            run_ttl_s: default_run_ttl_s(),
            max_entries: default_max_entries(),
            version: default_cache_version(),
        }
    }
}

fn default_terrain_ttl_s() -> u64 {
    24 * 60 * 60
}

fn default_agent_ttl_s() -> u64 {
    30 * 60
}

fn default_run_ttl_s() -> u64 {
    7 * 24 * 60 * 60
}

fn default_max_entries() -> usize {
    500
}

fn default_cache_version() -> String {
    "1".to_string()
}

/// Health monitor parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Periodic probe interval (milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-probe timeout, independent of data-call timeouts
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Latency above which a reachable agent is marked degraded
    #[serde(default = "default_degraded_threshold_ms")]
    pub degraded_threshold_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            degraded_threshold_ms: default_degraded_threshold_ms(),
        }
    }
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_degraded_threshold_ms() -> u64 {
    2_000
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from a specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("loading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to a specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("saving config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Initialize the config file and cache directory
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("config already exists at {:?}", config_path);
    } else {
        let config = Config::default();
        config.save().await?;
        info!("config written to {:?}", config_path);
    }

    let cache = cache_dir();
    tokio::fs::create_dir_all(&cache).await?;
    info!("cache directory ready at {:?}", cache);

    Config::load().await
}
