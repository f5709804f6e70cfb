//! Agent health monitoring
//!
//! Keeps a best-effort, point-in-time view of each agent's reachability and
//! capability surface, with an optional cancellable periodic probe loop.

use chrono::{DateTime, Utc};
use pistelink_config::Config;
use pistelink_protocol::{AgentError, AgentKind, TransportSet};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Agent reachability state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Never probed
    Unknown,
    Healthy,
    /// Reachable but slower than the configured threshold
    Degraded,
    Failed,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthState::Unknown => "unknown",
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time health snapshot, overwritten on every probe or failed call
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub agent: AgentKind,
    pub state: HealthState,
    pub response_time_ms: Option<u64>,
    pub last_error: Option<String>,
    /// Methods the agent advertised on the last MCP discovery
    pub available_methods: Vec<String>,
    /// Expected methods the agent did not advertise
    pub missing_methods: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct MonitorInner {
    transports: TransportSet,
    statuses: RwLock<HashMap<AgentKind, AgentHealth>>,
    running: Mutex<Option<RunningLoop>>,
    probe_timeout: Duration,
    degraded_threshold: Duration,
}

impl MonitorInner {
    async fn state_of(&self, agent: AgentKind) -> HealthState {
        self.statuses
            .read()
            .await
            .get(&agent)
            .map(|health| health.state)
            .unwrap_or(HealthState::Unknown)
    }

    async fn probe_agent(&self, agent: AgentKind) -> AgentHealth {
        let transport = self.transports.get(agent);
        let started = Instant::now();

        let health = match transport.probe(self.probe_timeout).await {
            Ok(reply) => {
                let elapsed = started.elapsed();
                let available = reply.methods.unwrap_or_default();
                let missing = if available.is_empty() {
                    Vec::new()
                } else {
                    agent
                        .expected_methods()
                        .into_iter()
                        .filter(|method| !available.contains(method))
                        .collect()
                };
                AgentHealth {
                    agent,
                    state: classify(elapsed, self.degraded_threshold),
                    response_time_ms: Some(elapsed.as_millis() as u64),
                    last_error: None,
                    available_methods: available,
                    missing_methods: missing,
                    checked_at: Utc::now(),
                }
            }
            Err(error) => {
                debug!(agent = %agent, error = %error, "probe failed");
                AgentHealth {
                    agent,
                    state: HealthState::Failed,
                    response_time_ms: None,
                    last_error: Some(error.to_string()),
                    available_methods: Vec::new(),
                    missing_methods: Vec::new(),
                    checked_at: Utc::now(),
                }
            }
        };

        self.statuses.write().await.insert(agent, health.clone());
        health
    }
}

fn classify(elapsed: Duration, degraded_threshold: Duration) -> HealthState {
    if elapsed > degraded_threshold {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

/// Health monitor over the configured agents
#[derive(Clone)]
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
}

impl HealthMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                transports: TransportSet::from_config(&config.agents),
                statuses: RwLock::new(HashMap::new()),
                running: Mutex::new(None),
                probe_timeout: Duration::from_millis(config.health.probe_timeout_ms),
                degraded_threshold: Duration::from_millis(config.health.degraded_threshold_ms),
            }),
        }
    }

    /// Probe one agent and refresh its snapshot
    pub async fn probe(&self, agent: AgentKind) -> AgentHealth {
        self.inner.probe_agent(agent).await
    }

    /// Probe every configured agent
    pub async fn probe_all(&self) -> Vec<AgentHealth> {
        let mut results = Vec::with_capacity(AgentKind::ALL.len());
        for agent in AgentKind::ALL {
            results.push(self.inner.probe_agent(agent).await);
        }
        results
    }

    /// Last known snapshot without probing
    pub async fn status(&self, agent: AgentKind) -> Option<AgentHealth> {
        self.inner.statuses.read().await.get(&agent).cloned()
    }

    /// Refresh the snapshot after a data call exhausted its retries
    pub async fn record_failure(&self, agent: AgentKind, error: &AgentError) {
        let mut statuses = self.inner.statuses.write().await;
        let (available, missing) = statuses
            .get(&agent)
            .map(|health| {
                (
                    health.available_methods.clone(),
                    health.missing_methods.clone(),
                )
            })
            .unwrap_or_default();

        statuses.insert(
            agent,
            AgentHealth {
                agent,
                state: HealthState::Failed,
                response_time_ms: None,
                last_error: Some(error.to_string()),
                available_methods: available,
                missing_methods: missing,
                checked_at: Utc::now(),
            },
        );
    }

    /// Start the periodic probe loop.
    ///
    /// `on_change` fires whenever an agent's state differs from its previous
    /// snapshot. A cycle that overruns the interval skips the missed tick
    /// rather than queueing it.
    pub async fn start_monitoring<F>(&self, interval: Duration, on_change: F)
    where
        F: Fn(&AgentHealth, HealthState) + Send + Sync + 'static,
    {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            warn!("monitor loop already running");
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        for agent in AgentKind::ALL {
                            let previous = inner.state_of(agent).await;
                            let health = inner.probe_agent(agent).await;
                            if health.state != previous {
                                info!(
                                    agent = %agent,
                                    from = %previous,
                                    to = %health.state,
                                    "agent status changed"
                                );
                                on_change(&health, previous);
                            }
                        }
                    }
                }
            }

            debug!("monitor loop stopped");
        });

        *running = Some(RunningLoop { token, handle });
        info!(interval_ms = interval.as_millis() as u64, "monitor loop started");
    }

    /// Stop the loop and wait for it to finish.
    ///
    /// An in-flight probe cycle completes, but no tick fires after this
    /// returns.
    pub async fn stop_monitoring(&self) {
        let running = self.inner.running.lock().await.take();
        if let Some(running) = running {
            running.token.cancel();
            let _ = running.handle.await;
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }
}
