use std::future::Future;
use std::time::Duration;

use config::shared::RetryConfig;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cdc_error;
use crate::error::{CdcResult, ErrorKind};

/// Bounded exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_percent: u8,
}

impl RetryPolicy {
    /// Policy retrying immediately, up to `max_attempts` attempts in total.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_percent: 0,
        }
    }

    /// Delay before retry number `retry` (starting at 0), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.base_delay(retry);
        if self.jitter_percent == 0 || base.is_zero() {
            return base;
        }

        let jitter_range = base.as_secs_f64() * (self.jitter_percent as f64 / 100.0);
        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((base.as_secs_f64() + jitter).max(0.0))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter_percent: config.jitter_percent,
        }
    }
}

/// Runs `operation` until it succeeds, the attempts run out or `cancel` fires.
///
/// Exhaustion returns [`ErrorKind::RetriesExhausted`] with the last failure as source.
/// Cancellation while waiting returns [`ErrorKind::Cancelled`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &'static str,
    mut operation: F,
) -> CdcResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CdcResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            return Err(cdc_error!(
                ErrorKind::RetriesExhausted,
                "Operation failed after all retry attempts",
                format!("{operation_name} failed {attempt} times"),
                source: err
            ));
        }

        let delay = policy.jittered_delay(attempt - 1);
        warn!(
            operation = operation_name,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "operation failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(cdc_error!(
                    ErrorKind::Cancelled,
                    "Retry interrupted by cancellation",
                    operation_name
                ));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
