//! Bounded retry with exponential backoff
//!
//! Delays are deterministic per attempt number: `min(base * multiplier^(n-1),
//! max)`. No jitter. Per-attempt cancellation is the transport timeout's job;
//! a timed-out attempt just counts as one failed attempt here.

use pistelink_config::RetryConfig;
use pistelink_protocol::AgentError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry parameters plus the allow-list of retryable remote codes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    retryable_codes: Vec<i64>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            retryable_codes: config.retryable_codes.clone(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = scaled.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Timeouts always retry; remote codes retry only when allow-listed
    pub fn is_retryable(&self, error: &AgentError) -> bool {
        match error {
            AgentError::Timeout(_) => true,
            AgentError::Remote { code, .. } => self.retryable_codes.contains(code),
            _ => false,
        }
    }

    /// Run one logical operation with bounded retry.
    ///
    /// Returns the first success, or the last attempt's error verbatim.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, AgentError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !self.is_retryable(&error) || attempt >= self.max_attempts {
                        return Err(error);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
