//! Exponential backoff with a cap on total elapsed time.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Result, SenseError};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Retrying stops once the next wait would exceed this budget.
    pub total_cap: Duration,
}

impl RetryPolicy {
    pub fn new(total_cap: Duration) -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            total_cap,
        }
    }

    /// Never retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// total cap is exhausted. The last error is returned on give-up.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut delay = self.initial_delay;
        let mut attempt = 1u32;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    let elapsed = started.elapsed();
                    if elapsed + delay > self.total_cap {
                        tracing::error!(
                            what,
                            attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        return Err(SenseError::TransientNetwork(format!(
                            "{what}: gave up after {attempt} attempts: {e}"
                        )));
                    }
                    tracing::warn!(
                        what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                    attempt += 1;
                }
            }
        }
    }
}
