//! Re-running transactions that lost a race for the database.
//!
//! SQLite in WAL mode starts transactions deferred: a transaction that read
//! before another connection committed fails with `SQLITE_BUSY_SNAPSHOT`
//! when it tries to write, and the busy timeout does not help. PostgreSQL
//! reports serialization failures and deadlocks the same way. In both cases
//! the whole transaction has been rolled back and can run again from the top.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that may succeed when the failed operation is simply repeated.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on the exponential backoff between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// Backoff before attempt `attempt + 1`, with up to 50% random jitter so
    /// competing writers do not wake up in lockstep.
    fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..0.5);
        exponential.mul_f64(1.0 + jitter)
    }
}

/// Runs `operation`, starting it again while it fails with a transient error
/// and attempts remain. Each call must open its own transaction.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err) if err.is_transient() && attempt < config.max_attempts => {
                let delay = config.delay(attempt);
                warn!(attempt, max_attempts = config.max_attempts, ?delay, error = %err, "database busy, retrying transaction");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
