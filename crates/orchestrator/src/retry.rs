//! Bounded retry with exponential backoff around engine calls.
//!
//! Only transient failures (network, timeout, rate limit) are retried;
//! authentication failures, malformed responses, and API errors surface
//! immediately. The delay doubles per attempt.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use modelmux_config::OrchestratorConfig;
use modelmux_core::error::EngineError;

/// Retry policy applied to each engine call inside a turn.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// No retries, for tests and fail-fast paths.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt - 1)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run
    /// out. The closure is re-invoked per attempt, so it must be cheap to
    /// rebuild the request.
    pub async fn run<T, F, Fut>(&self, operation: F) -> Result<T, EngineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = match &e {
                        // A rate limit tells us exactly how long to wait
                        EngineError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs)
                        }
                        _ => self.delay_for(attempt),
                    };
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient engine error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
