//! Retry logic with capped exponential backoff.
//!
//! [`RetryPolicy`] wraps one logical service operation. It consults the
//! circuit breaker before every attempt, reports each outcome back to it, and
//! sleeps between retryable failures without holding any lock. Both the
//! attempt and the backoff sleep race a [`CancellationToken`], so an abandoned
//! caller stops the loop promptly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::{ServiceError, ServiceId};

/// Capped exponential backoff between retries.
///
/// The delay is calculated as `base * (factor ^ attempt)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// The initial backoff duration.
    pub base: Duration,
    /// The multiplicative factor for each subsequent retry.
    pub factor: f64,
    /// The maximum duration to wait between retries.
    pub max: Duration,
    /// Whether to apply random jitter (+/- 50%) to the delay.
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Calculate the delay for a given retry attempt.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The retry attempt number (0-based)
    pub fn delay(self, attempt: u32) -> Duration {
        let scale = self.factor.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let seconds = self.base.as_secs_f64() * scale;
        let capped_seconds = seconds.min(self.max.as_secs_f64());

        let mut delay = Duration::from_secs_f64(capped_seconds);

        if self.jitter {
            let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
            let random_offset = fastrand::u64(0..=(jitter_ms * 2));
            let total_ms = delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
            delay = Duration::from_millis(total_ms.max(0) as u64);
        }

        delay
    }
}

/// Configuration for the automatic retry mechanism.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Enables or disables the retry mechanism.
    pub enabled: bool,
    /// The maximum number of retries to attempt.
    /// Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// The backoff strategy to use between retries.
    pub backoff: Backoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            backoff: Backoff::default(),
        }
    }
}

impl RetryConfig {
    /// Disable retries.
    pub fn no_retry() -> Self {
        Self {
            enabled: false,
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    fn effective_retries(&self) -> u32 {
        if self.enabled {
            self.max_retries
        } else {
            0
        }
    }
}

/// Retry loop bound to the shared circuit breaker.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Arc<CircuitBreaker>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, breaker: Arc<CircuitBreaker>) -> Self {
        Self { config, breaker }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Runs `operation` until it succeeds, fails terminally, exhausts its
    /// retries, hits an open circuit, or `cancel` fires.
    pub async fn execute<T, F, Fut>(
        &self,
        service: ServiceId,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let max_retries = self.config.effective_retries();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::cancelled(service));
            }

            let Some(admission) = self.breaker.admit(service) else {
                debug!(service = service.as_str(), attempt, "circuit open; failing fast");
                return Err(ServiceError::circuit_open(service));
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.breaker.release_probe(service, admission);
                    return Err(ServiceError::cancelled(service));
                }
                outcome = operation() => outcome,
            };

            let error = match outcome {
                Ok(value) => {
                    self.breaker.record_success(service);
                    return Ok(value);
                }
                Err(error) => error,
            };

            self.report_failure(&error, admission);

            if !error.retryable() || attempt >= max_retries {
                return Err(error);
            }

            let delay = self.config.delay_for_attempt(attempt);
            debug!(
                service = service.as_str(),
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                code = error.code(),
                "retrying after backoff"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ServiceError::cancelled(service)),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn report_failure(&self, error: &ServiceError, admission: Admission) {
        let service = error.service();
        if error.kind().counts_against_circuit() {
            self.breaker.record_failure(service);
        } else if error.reached_service() {
            self.breaker.record_reachable(service, admission);
        } else {
            self.breaker.release_probe(service, admission);
        }
    }
}
