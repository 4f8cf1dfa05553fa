// Per-owner request ceiling for the document store.
//
// Each owner gets a bucket holding at most `per_minute` permits, refilled
// continuously. Buckets live in memory and start full.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Bucket {
    permits: f64,
    updated: Instant,
}

pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    per_minute: u64,
}

impl RateLimiter {
    pub fn new(per_minute: u64) -> Self {
        Self {
            buckets: DashMap::new(),
            per_minute,
        }
    }

    pub fn limit_per_minute(&self) -> u64 {
        self.per_minute
    }

    fn permits_per_sec(&self) -> f64 {
        self.per_minute as f64 / 60.0
    }

    /// Takes one permit from `key`'s bucket.
    ///
    /// On refusal returns how long until the next permit becomes available.
    pub fn try_acquire(&self, key: &str) -> Result<(), Duration> {
        let capacity = self.per_minute as f64;
        let rate = self.permits_per_sec();
        let now = Instant::now();

        let mut bucket = self.buckets.entry(key.to_string()).or_insert(Bucket {
            permits: capacity,
            updated: now,
        });

        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.permits = (bucket.permits + elapsed * rate).min(capacity);
        bucket.updated = now;

        if bucket.permits >= 1.0 {
            bucket.permits -= 1.0;
            return Ok(());
        }

        if rate <= 0.0 {
            return Err(Duration::MAX);
        }
        Err(Duration::from_secs_f64((1.0 - bucket.permits) / rate))
    }

    /// Number of owners with a bucket in memory.
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }

    /// Drops buckets that have refilled to capacity. A dropped bucket is
    /// indistinguishable from a new one, which also starts full.
    pub fn purge_idle(&self) -> usize {
        let capacity = self.per_minute as f64;
        let rate = self.permits_per_sec();
        let now = Instant::now();

        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
            bucket.permits + elapsed * rate < capacity
        });
        before.saturating_sub(self.buckets.len())
    }
}

/// Periodically drops idle buckets. Runs until the task is dropped.
pub async fn run_bucket_cleanup(limiter: Arc<RateLimiter>, interval_seconds: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));

    loop {
        interval.tick().await;
        let purged = limiter.purge_idle();
        if purged > 0 {
            tracing::debug!(purged, remaining = limiter.tracked(), "Idle rate limit buckets purged");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_full_bucket_then_refused() {
        let limiter = RateLimiter::new(3);

        for _ in 0..3 {
            assert!(limiter.try_acquire("u1").is_ok());
        }
        let wait = limiter.try_acquire("u1").unwrap_err();

        // 3/minute: one permit every 20s
        assert!(wait > Duration::from_secs(19));
        assert!(wait <= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_owners_do_not_share_buckets() {
        let limiter = RateLimiter::new(1);

        assert!(limiter.try_acquire("u1").is_ok());
        assert!(limiter.try_acquire("u1").is_err());
        assert!(limiter.try_acquire("u2").is_ok());
        assert_eq!(limiter.tracked(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refills_with_time() {
        // one permit per second
        let limiter = RateLimiter::new(60);
        for _ in 0..60 {
            limiter.try_acquire("u1").unwrap();
        }
        assert!(limiter.try_acquire("u1").is_err());

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert!(limiter.try_acquire("u1").is_ok());
        assert!(limiter.try_acquire("u1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_capped_at_capacity() {
        let limiter = RateLimiter::new(2);
        limiter.try_acquire("u1").unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;

        assert!(limiter.try_acquire("u1").is_ok());
        assert!(limiter.try_acquire("u1").is_ok());
        assert!(limiter.try_acquire("u1").is_err());
    }

    #[test]
    fn test_zero_limit_never_refills() {
        let limiter = RateLimiter::new(0);
        assert_eq!(limiter.try_acquire("u1"), Err(Duration::MAX));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_drops_only_refilled_buckets() {
        // one permit per second
        let limiter = RateLimiter::new(60);
        limiter.try_acquire("idle").unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        for _ in 0..10 {
            limiter.try_acquire("busy").unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(limiter.purge_idle(), 1);
        assert_eq!(limiter.tracked(), 1);

        // the busy owner keeps its debt
        for _ in 0..52 {
            limiter.try_acquire("busy").unwrap();
        }
        assert!(limiter.try_acquire("busy").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges_periodically() {
        let limiter = Arc::new(RateLimiter::new(60));
        limiter.try_acquire("u1").unwrap();
        let task = tokio::spawn(run_bucket_cleanup(limiter.clone(), 60));

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(limiter.tracked(), 0);
        task.abort();
    }
}
