// Minimum spacing between consecutive calls to one gateway.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between calls made through the same client.
///
/// The gateway's embedded HTTP stack falls over under back-to-back requests,
/// so sequential reads and writes wait out the remainder of the interval.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until at least `interval` has passed since the previous call.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn spaces_consecutive_calls() {
        let throttle = Throttle::new(Duration::from_millis(200));
        let start = Instant::now();

        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        throttle.wait().await;
        throttle.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_gap_counts_toward_interval() {
        let throttle = Throttle::new(Duration::from_millis(200));
        throttle.wait().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        let before = Instant::now();
        throttle.wait().await;
        assert_eq!(before.elapsed(), Duration::ZERO);
    }
}
