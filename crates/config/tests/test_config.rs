//! Tests for Config serialization, deserialization, and defaults

use pistelink_config::{AgentEndpoint, Config, Protocol};
use tempfile::TempDir;

/// Helper to create a temporary directory for tests
fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Test that default Config has expected values
#[test]
fn test_config_defaults() {
    let config = Config::default();

    // Agent endpoints
    assert_eq!(config.agents.hill_metrics.host, "127.0.0.1");
    assert_eq!(config.agents.hill_metrics.port, 8081);
    assert_eq!(config.agents.weather.port, 8082);
    assert_eq!(config.agents.equipment.port, 8083);
    assert_eq!(config.agents.hill_metrics.path, "/rpc");
    assert_eq!(config.agents.hill_metrics.protocol, Protocol::JsonRpc);
    assert_eq!(config.agents.hill_metrics.timeout_ms, 10_000);

    // Retry defaults
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay_ms, 500);
    assert_eq!(config.retry.max_delay_ms, 8_000);
    assert_eq!(config.retry.multiplier, 2.0);
    assert!(config.retry.retryable_codes.contains(&-32000));
    assert!(config.retry.retryable_codes.contains(&503));

    // Cache defaults
    assert_eq!(config.cache.terrain_ttl_s, 86_400);
    assert_eq!(config.cache.agent_ttl_s, 1_800);
    assert_eq!(config.cache.run_ttl_s, 604_800);
    assert_eq!(config.cache.max_entries, 500);
    assert_eq!(config.cache.version, "1");

    // Health defaults
    assert_eq!(config.health.interval_ms, 60_000);
    assert_eq!(config.health.probe_timeout_ms, 5_000);
    assert_eq!(config.health.degraded_threshold_ms, 2_000);
}

#[test]
fn test_endpoint_url() {
    let ep = AgentEndpoint::on_port(9000);
    assert_eq!(ep.url(), "http://127.0.0.1:9000/rpc");

    let custom = AgentEndpoint {
        host: "agents.example.com".to_string(),
        port: 443,
        path: "/mcp".to_string(),
        protocol: Protocol::Mcp,
        timeout_ms: 5_000,
    };
    assert_eq!(custom.url(), "http://agents.example.com:443/mcp");
}

#[tokio::test]
async fn test_save_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.agents.weather.port = 9999;
    config.agents.weather.protocol = Protocol::Mcp;
    config.retry.max_attempts = 5;
    config.cache.version = "2".to_string();

    config.save_to(&path).await.expect("save failed");
    let loaded = Config::load_from(&path).await.expect("load failed");

    assert_eq!(loaded.agents.weather.port, 9999);
    assert_eq!(loaded.agents.weather.protocol, Protocol::Mcp);
    assert_eq!(loaded.retry.max_attempts, 5);
    assert_eq!(loaded.cache.version, "2");
    // Untouched sections keep defaults
    assert_eq!(loaded.agents.hill_metrics.port, 8081);
}

#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("does_not_exist.json");

    let config = Config::load_from(&path).await.expect("load failed");
    assert_eq!(config.retry.max_attempts, 3);
}

#[tokio::test]
async fn test_load_partial_file_fills_defaults() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");

    let partial = r#"{ "retry": { "max_attempts": 7 } }"#;
    tokio::fs::write(&path, partial).await.unwrap();

    let config = Config::load_from(&path).await.expect("load failed");
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.retry.base_delay_ms, 500);
    assert_eq!(config.cache.terrain_ttl_s, 86_400);
}

#[tokio::test]
async fn test_load_malformed_file_errors() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");

    tokio::fs::write(&path, "not json at all").await.unwrap();

    let result = Config::load_from(&path).await;
    assert!(result.is_err());
}

#[test]
fn test_protocol_display() {
    assert_eq!(Protocol::JsonRpc.to_string(), "json-rpc");
    assert_eq!(Protocol::Mcp.to_string(), "mcp");
}

#[test]
fn test_protocol_serde_format() {
    let json = serde_json::to_string(&Protocol::JsonRpc).unwrap();
    assert_eq!(json, r#""json-rpc""#);

    let parsed: Protocol = serde_json::from_str(r#""mcp""#).unwrap();
    assert_eq!(parsed, Protocol::Mcp);
}

#[test]
fn test_safe_filename() {
    use pistelink_config::paths::safe_filename;

    assert_eq!(safe_filename("terrain:alpine-a:64x64"), "terrain_alpine-a_64x64");
    assert_eq!(safe_filename("plain-name"), "plain-name");
    assert_eq!(safe_filename("a/b\\c*d"), "a_b_c_d");
}
