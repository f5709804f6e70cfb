//! Agent client façade for Pistelink
//!
//! One typed operation per agent capability, with input validation ahead of
//! any network activity, retry/backoff underneath, and batched execution.
//! Protocol and retry details stay behind this surface.

use chrono::{DateTime, Utc};
use pistelink_config::{AgentEndpoint, AgentsConfig, Config};
use pistelink_health::{AgentHealth, HealthMonitor};
use pistelink_protocol::{
    endpoint_for, AgentError, AgentKind, AgentRequest, AgentResponse, AgentTransport, GridSize,
    Result, TransportSet,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub mod retry;

pub use retry::RetryPolicy;

/// How a batch runs
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    /// Issue all requests together instead of one after another
    pub parallel: bool,
    /// Timeout override applied to requests that carry none of their own
    pub timeout_ms: Option<u64>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            timeout_ms: None,
        }
    }
}

/// One batch item's outcome, in input order
#[derive(Debug)]
pub struct BatchItem {
    pub agent: AgentKind,
    pub area_id: String,
    pub result: Result<AgentResponse>,
}

/// Aggregate batch outcome
#[derive(Debug)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
}

struct ClientInner {
    agents: AgentsConfig,
    transports: TransportSet,
    retry: RetryPolicy,
    monitor: HealthMonitor,
}

/// The single entry point callers use to talk to the agents
#[derive(Clone)]
pub struct AgentClient {
    inner: Arc<ClientInner>,
}

impl AgentClient {
    pub fn new(config: &Config, monitor: HealthMonitor) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                agents: config.agents.clone(),
                transports: TransportSet::from_config(&config.agents),
                retry: RetryPolicy::from_config(&config.retry),
                monitor,
            }),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry
    }

    /// Terrain grid for a run
    pub async fn fetch_terrain(&self, run_id: &str, grid: GridSize) -> Result<AgentResponse> {
        self.execute(&AgentRequest::terrain(run_id, grid)).await
    }

    /// Weather for an area, optionally at a point in time
    pub async fn fetch_weather(
        &self,
        area_id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<AgentResponse> {
        let mut request = AgentRequest::weather(area_id);
        if let Some(timestamp) = at {
            request = request.with_timestamp(timestamp);
        }
        self.execute(&request).await
    }

    /// Equipment inventory for an area
    pub async fn fetch_equipment(&self, area_id: &str) -> Result<AgentResponse> {
        self.execute(&AgentRequest::equipment(area_id)).await
    }

    /// Probe the agent and return the fresh snapshot
    pub async fn health_check(&self, agent: AgentKind) -> AgentHealth {
        self.inner.monitor.probe(agent).await
    }

    /// Execute one request: validate, select transport, retry, decode.
    pub async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse> {
        validate(request)?;

        let inner = &self.inner;
        let endpoint = endpoint_for(&inner.agents, request.agent);

        // Per-call protocol override rebuilds the codec; the common case
        // reuses the one fixed at construction.
        let override_transport;
        let transport: &AgentTransport = match request.protocol {
            Some(protocol) if protocol != endpoint.protocol => {
                override_transport =
                    AgentTransport::with_protocol(request.agent, endpoint, protocol);
                &override_transport
            }
            _ => inner.transports.get(request.agent),
        };

        let timeout = call_timeout(request, endpoint);
        let method = request.method();
        let params = request.params.to_params();
        let started = Instant::now();

        let outcome = inner
            .retry
            .run(|_attempt| {
                let params = params.clone();
                async move { transport.call(method, params, timeout).await }
            })
            .await;

        match outcome {
            Ok(payload) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                debug!(
                    agent = %request.agent,
                    method,
                    elapsed_ms,
                    protocol = %transport.protocol(),
                    "request succeeded"
                );
                Ok(AgentResponse::new(
                    payload,
                    elapsed_ms,
                    format!("{}@{}", request.agent, transport.url()),
                ))
            }
            Err(error) => {
                warn!(agent = %request.agent, method, error = %error, "request failed");
                inner.monitor.record_failure(request.agent, &error).await;
                Err(error)
            }
        }
    }

    /// Execute a heterogeneous list of requests.
    ///
    /// In parallel mode all requests are issued together and one slow or
    /// failing item does not block the others; in sequential mode strict
    /// input order is preserved. Either way the report lists every item.
    pub async fn batch(&self, requests: Vec<AgentRequest>, options: BatchOptions) -> BatchReport {
        let started = Instant::now();
        let mut slots: Vec<Option<BatchItem>> = requests.iter().map(|_| None).collect();

        if options.parallel {
            let mut set = JoinSet::new();
            for (index, request) in requests.into_iter().enumerate() {
                let client = self.clone();
                let request = apply_batch_timeout(request, options.timeout_ms);
                set.spawn(async move {
                    let result = client.execute(&request).await;
                    (index, request, result)
                });
            }
            while let Some(joined) = set.join_next().await {
                if let Ok((index, request, result)) = joined {
                    slots[index] = Some(BatchItem {
                        agent: request.agent,
                        area_id: request.params.area_id.clone(),
                        result,
                    });
                }
            }
        } else {
            for (index, request) in requests.into_iter().enumerate() {
                let request = apply_batch_timeout(request, options.timeout_ms);
                let result = self.execute(&request).await;
                slots[index] = Some(BatchItem {
                    agent: request.agent,
                    area_id: request.params.area_id.clone(),
                    result,
                });
            }
        }

        let items: Vec<BatchItem> = slots.into_iter().flatten().collect();
        let succeeded = items.iter().filter(|item| item.result.is_ok()).count();
        let failed = items.len() - succeeded;

        BatchReport {
            items,
            succeeded,
            failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn call_timeout(request: &AgentRequest, endpoint: &AgentEndpoint) -> Duration {
    Duration::from_millis(request.timeout_ms.unwrap_or(endpoint.timeout_ms))
}

/// Request-level timeouts win over the batch option
fn apply_batch_timeout(mut request: AgentRequest, timeout_ms: Option<u64>) -> AgentRequest {
    if request.timeout_ms.is_none() {
        request.timeout_ms = timeout_ms;
    }
    request
}

/// Fail fast on bad input; never reaches the retry engine.
fn validate(request: &AgentRequest) -> Result<()> {
    if request.params.area_id.trim().is_empty() {
        return Err(AgentError::Validation(
            "area identifier must not be empty".to_string(),
        ));
    }
    if let Some(boundary) = &request.params.boundary {
        if boundary.len() < 3 {
            return Err(AgentError::Validation(format!(
                "boundary polygon needs at least 3 points, got {}",
                boundary.len()
            )));
        }
    }
    Ok(())
}
