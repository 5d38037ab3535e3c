use std::future::Future;
use std::time::Duration;

use quotesync_api::TransportError;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{error, warn};

/// Exponential backoff for transient transport failures.
///
/// The delay before retry `n` (1-based) is `base_delay × 2^(n-1)`, so the
/// defaults wait 2 s, 4 s and 8 s before giving up after four attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
        }
    }
}

/// The last error of a retried call, with the number of attempts made.
#[derive(Debug, Clone)]
pub struct Exhausted {
    pub error: TransportError,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 0,
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry.saturating_sub(1)).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Run `call` until it succeeds, fails permanently or retries run out.
    ///
    /// `call` receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    return Err(Exhausted {
                        error: err,
                        attempts: attempt,
                    });
                }
                Err(err) => {
                    if attempt > self.max_retries {
                        error!(
                            operation,
                            attempts = attempt,
                            error = %err,
                            "[Retry] retries exhausted"
                        );
                        return Err(Exhausted {
                            error: err,
                            attempts: attempt,
                        });
                    }
                    let backoff = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "[Retry] transient failure, retrying"
                    );
                    sleep(backoff).await;
                }
            }
        }
    }
}
