//! Degradation policy tests: live, cached-fallback, and unavailable paths

mod support;

use pistelink_cache::{keys, Category, TieredCache};
use pistelink_client::AgentClient;
use pistelink_config::{CacheConfig, Config};
use pistelink_coordinator::{DataOrigin, DegradationCoordinator};
use pistelink_health::HealthMonitor;
use pistelink_protocol::{AgentError, AgentKind, GridSize};
use serde_json::json;
use support::{MockAgent, Reply};
use tempfile::TempDir;

fn test_config(port: u16) -> Config {
    let mut config = Config::default();
    for endpoint in [
        &mut config.agents.hill_metrics,
        &mut config.agents.weather,
        &mut config.agents.equipment,
    ] {
        endpoint.host = "127.0.0.1".to_string();
        endpoint.port = port;
        endpoint.path = "/rpc".to_string();
        endpoint.timeout_ms = 1_000;
    }
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 40;
    config
}

struct Stack {
    coordinator: DegradationCoordinator,
    monitor: HealthMonitor,
    cache: TieredCache,
    _dir: TempDir,
}

fn build_stack(port: u16) -> Stack {
    let config = test_config(port);
    let dir = tempfile::tempdir().expect("temp dir");
    let cache = TieredCache::new(dir.path(), &CacheConfig::default());
    let monitor = HealthMonitor::new(&config);
    let client = AgentClient::new(&config, monitor.clone());
    Stack {
        coordinator: DegradationCoordinator::new(client, cache.clone(), monitor.clone()),
        monitor,
        cache,
        _dir: dir,
    }
}

// ============================================================================
// Live Path Tests
// ============================================================================

#[tokio::test]
async fn test_live_success_writes_through_to_cache() {
    let agent = MockAgent::start(Reply::Result(json!({ "elevation": [812.0] }))).await;
    let stack = build_stack(agent.port());

    let fetched = stack
        .coordinator
        .fetch_terrain("alpine-a", GridSize::G64)
        .await
        .expect("fetch failed");

    assert_eq!(fetched.origin, DataOrigin::Live);
    assert!(fetched.meta.is_some());
    assert_eq!(fetched.payload["elevation"][0], 812.0);

    // The payload is now available offline
    let cached = stack
        .cache
        .read(Category::Terrain, &keys::terrain("alpine-a", "64x64"))
        .await;
    assert_eq!(cached, Some(json!({ "elevation": [812.0] })));
}

// ============================================================================
// Fallback Tests
// ============================================================================

#[tokio::test]
async fn test_failed_health_serves_cache_without_network() {
    let agent = MockAgent::start(Reply::Result(json!({}))).await;
    let stack = build_stack(agent.port());

    stack
        .cache
        .write(
            Category::Terrain,
            &keys::terrain("A", "64x64"),
            json!({ "elevation": [1.0] }),
            None,
        )
        .await
        .unwrap();
    stack
        .monitor
        .record_failure(
            AgentKind::HillMetrics,
            &AgentError::Timeout("earlier call timed out".to_string()),
        )
        .await;

    let fetched = stack
        .coordinator
        .fetch_terrain("A", GridSize::G64)
        .await
        .expect("fetch failed");

    assert_eq!(fetched.origin, DataOrigin::CachedFallback);
    assert!(fetched.meta.is_none());
    // The agent was never called
    assert_eq!(agent.hits(), 0);
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_cache() {
    let agent = MockAgent::start(Reply::Error(-32000, "transient")).await;
    let stack = build_stack(agent.port());

    stack
        .cache
        .write(
            Category::AgentResponse,
            &keys::agent("weather", "valley-3"),
            json!({ "snow_depth_cm": 42 }),
            None,
        )
        .await
        .unwrap();

    let fetched = stack
        .coordinator
        .fetch_weather("valley-3")
        .await
        .expect("fetch failed");

    assert_eq!(fetched.origin, DataOrigin::CachedFallback);
    assert_eq!(fetched.payload["snow_depth_cm"], 42);
    // All three attempts went to the wire before the cache stepped in
    assert_eq!(agent.hits(), 3);
}

// ============================================================================
// Unavailable Tests
// ============================================================================

#[tokio::test]
async fn test_empty_cache_and_dead_agent_yield_typed_unavailable() {
    // Nothing listens on the discard port
    let stack = build_stack(9);

    let err = stack
        .coordinator
        .fetch_weather("valley-3")
        .await
        .unwrap_err();

    match err {
        AgentError::Unavailable {
            agent,
            attempts,
            cause,
        } => {
            assert_eq!(agent, "weather");
            assert_eq!(attempts, 3);
            assert!(cause.contains("network timeout"));
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failed_health_and_empty_cache_yield_unavailable() {
    let stack = build_stack(9);
    stack
        .monitor
        .record_failure(AgentKind::Equipment, &AgentError::Timeout("down".to_string()))
        .await;

    let err = stack
        .coordinator
        .fetch_equipment("valley-3")
        .await
        .unwrap_err();

    match err {
        AgentError::Unavailable { agent, attempts, .. } => {
            assert_eq!(agent, "equipment");
            // The live call was skipped entirely
            assert_eq!(attempts, 0);
        }
        other => panic!("expected Unavailable, got {other:?}"),
    }
}

// ============================================================================
// Validation Tests
// ============================================================================

#[tokio::test]
async fn test_validation_error_is_not_masked_by_cache() {
    let stack = build_stack(9);
    let err = stack.coordinator.fetch_weather("").await.unwrap_err();
    assert!(matches!(err, AgentError::Validation(_)));
}

// ============================================================================
// Recovery Tests
// ============================================================================

#[tokio::test]
async fn test_recovered_agent_serves_live_again() {
    let agent = MockAgent::start(Reply::Result(json!({ "snow_depth_cm": 55 }))).await;
    let stack = build_stack(agent.port());

    // Mark the agent failed, but leave the cache warm
    stack
        .monitor
        .record_failure(AgentKind::Weather, &AgentError::Timeout("down".to_string()))
        .await;
    stack
        .cache
        .write(
            Category::AgentResponse,
            &keys::agent("weather", "valley-3"),
            json!({ "snow_depth_cm": 10 }),
            None,
        )
        .await
        .unwrap();

    let fetched = stack.coordinator.fetch_weather("valley-3").await.unwrap();
    assert_eq!(fetched.origin, DataOrigin::CachedFallback);
    assert_eq!(agent.hits(), 0);

    // A successful probe clears the gate; the next fetch goes live
    stack.monitor.probe(AgentKind::Weather).await;

    let fetched = stack.coordinator.fetch_weather("valley-3").await.unwrap();
    assert_eq!(fetched.origin, DataOrigin::Live);
    assert_eq!(fetched.payload["snow_depth_cm"], 55);

    // And the fresher payload replaced the cached one
    let cached = stack
        .cache
        .read(Category::AgentResponse, &keys::agent("weather", "valley-3"))
        .await;
    assert_eq!(cached, Some(json!({ "snow_depth_cm": 55 })));
}
