// Bounded retry for transient controller errors.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// How often and how patiently to retry a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    /// Run `op`, retrying only errors for which `Error::is_transient` holds.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, plcsync_api::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, plcsync_api::Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(what, attempt, error = %e, "transient failure, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
