//! Capped exponential backoff and an async retry helper.
//!
//! Used when assembling the combined document at startup, where backends may
//! still be coming up.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Attempt budget and capped exponential backoff between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts (1 = no retry).
    pub max_attempts: usize,
    /// Delay before the first retry; doubles on each further retry.
    pub base_ms: u64,
    /// Upper bound on any single delay.
    pub max_ms: u64,
}

impl RetryConfig {
    pub fn exponential(max_attempts: usize, base_ms: u64, max_ms: u64) -> Self {
        Self {
            max_attempts,
            base_ms,
            max_ms,
        }
    }

    /// Returns the sleep duration before the given retry attempt (0-indexed).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let ms = 1u64
            .checked_shl(attempt as u32)
            .and_then(|s| self.base_ms.checked_mul(s))
            .unwrap_or(self.max_ms)
            .min(self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Retry `f` up to `config.max_attempts` times, giving up early once the next
/// sleep would cross `deadline`.
///
/// Returns the last error when every attempt failed.
pub async fn retry_with_deadline<F, Fut, T, E>(
    config: &RetryConfig,
    deadline: Option<Instant>,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match f(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => e,
        };
        attempt += 1;
        if attempt >= max_attempts {
            return Err(err);
        }

        let delay = config.delay_for(attempt - 1);
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                return Err(err);
            }
        }
        tokio::time::sleep(delay).await;
    }
}
