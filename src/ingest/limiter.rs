use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Global outbound request gate shared by every worker.
///
/// Each `acquire` claims the next free send slot under the mutex and then
/// sleeps until that slot arrives, so the aggregate long-run rate never
/// exceeds the configured requests-per-second no matter how many workers
/// are calling in. Slots are handed out in lock-acquisition order, so no
/// caller can be postponed indefinitely.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1);
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(rps)),
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// Block until the caller may issue one outbound request.
    pub async fn acquire(&self) {
        let wake = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let wake = (*next).max(now);
            *next = wake + self.interval;
            wake
        };
        sleep_until(wake).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn caps_aggregate_rate_across_workers() {
        // 20 acquires at 50/s need at least 19 spaced intervals (~380ms).
        let limiter = Arc::new(RateLimiter::new(50));
        let start = std::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    limiter.acquire().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert!(
            start.elapsed() >= Duration::from_millis(350),
            "20 acquires at 50/s finished too fast: {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn single_caller_is_not_delayed_by_a_full_interval_initially() {
        let limiter = RateLimiter::new(1);
        let start = std::time::Instant::now();
        limiter.acquire().await;
        // First slot is immediate; only subsequent acquires wait.
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
