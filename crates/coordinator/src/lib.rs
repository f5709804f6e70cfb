//! Degradation coordinator for Pistelink
//!
//! The single decision point between live agent calls and cached fallback.
//! Callers get a payload tagged with its origin, or a typed error carrying
//! the agent, the attempt budget, and the underlying cause.

use pistelink_cache::{keys, Category, TieredCache};
use pistelink_client::AgentClient;
use pistelink_health::{HealthMonitor, HealthState};
use pistelink_protocol::{
    AgentError, AgentKind, AgentRequest, GridSize, ResponseMeta, Result,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};

/// Where a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataOrigin {
    Live,
    CachedFallback,
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataOrigin::Live => "live",
            DataOrigin::CachedFallback => "cached-fallback",
        };
        f.write_str(s)
    }
}

/// A payload plus its origin tag
#[derive(Debug, Clone, Serialize)]
pub struct Fetched {
    pub payload: Value,
    pub origin: DataOrigin,
    /// Present on live results only
    pub meta: Option<ResponseMeta>,
}

/// Health gate + live call + write-through + cached fallback
#[derive(Clone)]
pub struct DegradationCoordinator {
    client: AgentClient,
    cache: TieredCache,
    monitor: HealthMonitor,
}

impl DegradationCoordinator {
    pub fn new(client: AgentClient, cache: TieredCache, monitor: HealthMonitor) -> Self {
        Self {
            client,
            cache,
            monitor,
        }
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Terrain grid for a run
    pub async fn fetch_terrain(&self, run_id: &str, grid: GridSize) -> Result<Fetched> {
        self.fetch(&AgentRequest::terrain(run_id, grid)).await
    }

    /// General hill metrics for an area
    pub async fn fetch_hill_metrics(&self, area_id: &str) -> Result<Fetched> {
        self.fetch(&AgentRequest::hill_metrics(area_id)).await
    }

    /// Weather for an area
    pub async fn fetch_weather(&self, area_id: &str) -> Result<Fetched> {
        self.fetch(&AgentRequest::weather(area_id)).await
    }

    /// Equipment inventory for an area
    pub async fn fetch_equipment(&self, area_id: &str) -> Result<Fetched> {
        self.fetch(&AgentRequest::equipment(area_id)).await
    }

    /// The policy, identical for every agent:
    ///
    /// 1. An agent last seen `Failed` is not called; go straight to cache.
    /// 2. Otherwise call it through the client (retries included).
    /// 3. On success, write through to the cache and tag the result live.
    /// 4. On failure, a fresh cached entry answers instead; with nothing
    ///    cached the caller gets a typed `Unavailable`.
    pub async fn fetch(&self, request: &AgentRequest) -> Result<Fetched> {
        let (category, key) = cache_slot(request);

        let gate = self.monitor.status(request.agent).await.map(|h| h.state);
        if gate == Some(HealthState::Failed) {
            debug!(agent = %request.agent, "agent marked failed, skipping live call");
            return self
                .from_cache(request, category, &key, 0, "agent marked failed".to_string())
                .await;
        }

        match self.client.execute(request).await {
            Ok(response) => {
                if let Err(error) = self
                    .cache
                    .write(category, &key, response.payload.clone(), None)
                    .await
                {
                    // Best-effort durability; the live result still stands
                    warn!(key = %key, error = %error, "cache write-through failed");
                }
                Ok(Fetched {
                    payload: response.payload,
                    origin: DataOrigin::Live,
                    meta: Some(response.meta),
                })
            }
            Err(error @ AgentError::Validation(_)) => Err(error),
            Err(error) => {
                warn!(agent = %request.agent, error = %error, "live fetch failed, trying cache");
                self.from_cache(
                    request,
                    category,
                    &key,
                    self.client.retry_policy().max_attempts(),
                    error.to_string(),
                )
                .await
            }
        }
    }

    async fn from_cache(
        &self,
        request: &AgentRequest,
        category: Category,
        key: &str,
        attempts: u32,
        cause: String,
    ) -> Result<Fetched> {
        match self.cache.read(category, key).await {
            Some(payload) => {
                info!(agent = %request.agent, key, "serving cached fallback");
                Ok(Fetched {
                    payload,
                    origin: DataOrigin::CachedFallback,
                    meta: None,
                })
            }
            None => Err(AgentError::Unavailable {
                agent: request.agent.as_str().to_string(),
                attempts,
                cause,
            }),
        }
    }
}

/// Terrain queries with a grid land in the terrain category; everything else
/// is a raw agent response keyed by agent and area.
fn cache_slot(request: &AgentRequest) -> (Category, String) {
    match (request.agent, request.params.grid_size) {
        (AgentKind::HillMetrics, Some(grid)) => (
            Category::Terrain,
            keys::terrain(&request.params.area_id, grid.as_str()),
        ),
        _ => (
            Category::AgentResponse,
            keys::agent(request.agent.as_str(), &request.params.area_id),
        ),
    }
}
