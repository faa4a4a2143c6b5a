use std::thread;
use std::time::Duration;

use crate::shared::error::BlanketResult;

/// Retry policy for calls to external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt + 1`: `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

/// Runs `op` until it succeeds, fails permanently, or the retries run out.
///
/// Only errors whose `is_retryable()` is true are retried. The last error
/// is returned unchanged.
pub fn with_retry<T, F>(config: &RetryConfig, operation: &str, mut op: F) -> BlanketResult<T>
where
    F: FnMut() -> BlanketResult<T>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.delay_for(attempt);
                log::warn!(
                    "{operation} failed (attempt {}), retrying in {}ms: {e}",
                    attempt + 1,
                    delay.as_millis()
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
