//! Readiness waiter — polls the backend's HTTP surface until it answers.
//!
//! One GET per attempt against the base URL, each bounded by its own
//! timeout, with a fixed sleep in between. No backoff; the attempt budget
//! caps the total wait.

use std::time::Duration;

use super::error::SupervisorError;
use crate::config::SupervisorConfig;

/// Outcome of a successful wait. Ephemeral, not persisted.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessResult {
    pub attempts: u32,
}

pub struct ReadinessWaiter {
    client: reqwest::Client,
    max_attempts: u32,
    interval: Duration,
    attempt_timeout: Duration,
}

impl ReadinessWaiter {
    pub fn new(max_attempts: u32, interval: Duration, attempt_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts,
            interval,
            attempt_timeout,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(
            config.ready_max_attempts,
            config.ready_interval,
            config.ready_attempt_timeout,
        )
    }

    /// Wait until a GET against `url` returns a 2xx status.
    ///
    /// This checks liveness only; any successful response counts as ready.
    pub async fn wait_until_ready(&self, url: &str) -> Result<ReadinessResult, SupervisorError> {
        for attempt in 1..=self.max_attempts {
            match self
                .client
                .get(url)
                .timeout(self.attempt_timeout)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!("Backend ready after {} attempt(s)", attempt);
                    return Ok(ReadinessResult { attempts: attempt });
                }
                Ok(resp) => {
                    tracing::debug!("Backend not ready yet (HTTP {})", resp.status());
                }
                Err(e) => {
                    tracing::debug!("Backend not ready yet: {}", e);
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(SupervisorError::ReadinessTimeout {
            attempts: self.max_attempts,
        })
    }
}
