//! Pistelink command implementations

use anyhow::Result;
use pistelink_cache::TieredCache;
use pistelink_client::AgentClient;
use pistelink_config::{cache_dir, Config, Protocol};
use pistelink_coordinator::{DegradationCoordinator, Fetched};
use pistelink_health::HealthMonitor;
use pistelink_protocol::{AgentRequest, GridSize};
use serde_json::Value;
use std::time::Duration;

/// Wire the full stack from the local config
async fn build_stack() -> Result<(DegradationCoordinator, HealthMonitor, TieredCache)> {
    let config = Config::load().await?;
    let monitor = HealthMonitor::new(&config);
    let client = AgentClient::new(&config, monitor.clone());
    let cache = TieredCache::new(cache_dir(), &config.cache);
    let coordinator = DegradationCoordinator::new(client, cache.clone(), monitor.clone());
    Ok((coordinator, monitor, cache))
}

fn parse_protocol(protocol: Option<String>) -> Result<Option<Protocol>> {
    match protocol.as_deref() {
        None => Ok(None),
        Some("json-rpc") | Some("jsonrpc") => Ok(Some(Protocol::JsonRpc)),
        Some("mcp") => Ok(Some(Protocol::Mcp)),
        Some(other) => anyhow::bail!("unknown protocol: {other} (expected json-rpc or mcp)"),
    }
}

fn print_fetched(fetched: &Fetched) {
    println!("[{}]", fetched.origin);
    if let Some(meta) = &fetched.meta {
        println!("source: {} ({}ms)", meta.source, meta.elapsed_ms);
        if let Some(freshness) = &meta.freshness {
            println!("freshness: {freshness}");
        }
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&fetched.payload).unwrap_or_default()
    );
}

fn presence(value: &Option<Value>) -> &'static str {
    if value.is_some() {
        "cached"
    } else {
        "missing"
    }
}

/// Initialize config and cache directory
pub async fn init_command() -> Result<()> {
    pistelink_config::init().await?;
    println!("✓ Config and cache ready under {:?}", pistelink_config::data_dir());
    Ok(())
}

/// Probe all agents and print cache statistics
pub async fn status_command() -> Result<()> {
    let (_coordinator, monitor, cache) = build_stack().await?;

    println!("◆ Agent Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for health in monitor.probe_all().await {
        let latency = health
            .response_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        println!("  {:<14} {:<10} {latency}", health.agent.to_string(), health.state.to_string());
        if let Some(error) = &health.last_error {
            println!("    last error: {error}");
        }
        if !health.missing_methods.is_empty() {
            println!("    missing methods: {}", health.missing_methods.join(", "));
        }
    }

    let stats = cache.stats().await;
    println!();
    println!("◆ Cache");
    println!("  terrain: {} entries ({} bytes)", stats.terrain.entries, stats.terrain.approx_bytes);
    println!("  run:     {} entries ({} bytes)", stats.run.entries, stats.run.approx_bytes);
    println!("  agent:   {} entries ({} bytes)", stats.agent.entries, stats.agent.approx_bytes);

    Ok(())
}

/// Fetch a terrain grid through the degradation coordinator
pub async fn fetch_terrain_command(
    run: String,
    grid: GridSize,
    protocol: Option<String>,
) -> Result<()> {
    let (coordinator, _, _) = build_stack().await?;

    let mut request = AgentRequest::terrain(&run, grid);
    if let Some(protocol) = parse_protocol(protocol)? {
        request = request.with_protocol(protocol);
    }

    let fetched = coordinator.fetch(&request).await?;
    print_fetched(&fetched);
    Ok(())
}

/// Fetch weather through the degradation coordinator
pub async fn fetch_weather_command(area: String, protocol: Option<String>) -> Result<()> {
    let (coordinator, _, _) = build_stack().await?;

    let mut request = AgentRequest::weather(&area);
    if let Some(protocol) = parse_protocol(protocol)? {
        request = request.with_protocol(protocol);
    }

    let fetched = coordinator.fetch(&request).await?;
    print_fetched(&fetched);
    Ok(())
}

/// Fetch equipment through the degradation coordinator
pub async fn fetch_equipment_command(area: String, protocol: Option<String>) -> Result<()> {
    let (coordinator, _, _) = build_stack().await?;

    let mut request = AgentRequest::equipment(&area);
    if let Some(protocol) = parse_protocol(protocol)? {
        request = request.with_protocol(protocol);
    }

    let fetched = coordinator.fetch(&request).await?;
    print_fetched(&fetched);
    Ok(())
}

/// Report offline availability and bundle contents for a run
pub async fn offline_command(run: String, grid: GridSize) -> Result<()> {
    let (_, _, cache) = build_stack().await?;

    let available = cache.is_offline_available(&run, grid.as_str()).await;
    println!(
        "offline rendering for {run} at {grid}: {}",
        if available { "available" } else { "unavailable" }
    );

    let bundle = cache.assemble_offline_bundle(&run, grid.as_str()).await;
    println!("  terrain:      {}", presence(&bundle.terrain));
    println!("  run:          {}", presence(&bundle.run));
    println!("  hill-metrics: {}", presence(&bundle.hill_metrics));
    println!("  weather:      {}", presence(&bundle.weather));
    println!("  equipment:    {}", presence(&bundle.equipment));

    Ok(())
}

/// Print cache statistics
pub async fn cache_stats_command() -> Result<()> {
    let (_, _, cache) = build_stack().await?;
    let stats = cache.stats().await;

    println!("◆ Cache Statistics");
    println!("  terrain: {} entries ({} bytes)", stats.terrain.entries, stats.terrain.approx_bytes);
    println!("  run:     {} entries ({} bytes)", stats.run.entries, stats.run.approx_bytes);
    println!("  agent:   {} entries ({} bytes)", stats.agent.entries, stats.agent.approx_bytes);
    println!("  total:   {} entries", stats.total_entries());

    Ok(())
}

/// Sweep expired entries
pub async fn cache_cleanup_command() -> Result<()> {
    let (_, _, cache) = build_stack().await?;
    let removed = cache.cleanup().await?;
    println!("✓ Removed {removed} expired entries");
    Ok(())
}

/// Drop the whole cache
pub async fn cache_clear_command() -> Result<()> {
    let (_, _, cache) = build_stack().await?;
    cache.clear().await?;
    println!("✓ Cache cleared");
    Ok(())
}

/// Run the periodic monitor, printing transitions until Ctrl-C
pub async fn monitor_command(interval: u64) -> Result<()> {
    let (_, monitor, _) = build_stack().await?;

    monitor
        .start_monitoring(Duration::from_secs(interval), |health, previous| {
            println!("{}: {} -> {}", health.agent, previous, health.state);
        })
        .await;

    println!("monitoring every {interval}s, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    monitor.stop_monitoring().await;
    println!("stopped");
    Ok(())
}
