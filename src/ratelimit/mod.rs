//! Rate Limiter: per-host minimum inter-request gap enforcement.
//!
//! 256 shards, each an atomic `(timestamp_nanos, failure_count)` pair.
//! Shard index is `fast_hash(host) mod 256`; hosts that collide into the
//! same shard share the gap conservatively, which is the point: the
//! structure favors being over-polite on a hash collision over tracking
//! every host individually.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use crate::store::{DurableStore, RateLimitRow};

const SHARD_COUNT: usize = 256;
const BASE_GAP_MILLIS: u64 = 2;
const FAILURE_PENALTY_MILLIS: u64 = 5;
const MAX_FAILURE_PENALTY_MILLIS: u64 = 20;

struct Shard {
    timestamp_nanos: AtomicI64,
    failure_count: AtomicU32,
}

impl Shard {
    fn new() -> Self {
        Self {
            timestamp_nanos: AtomicI64::new(0),
            failure_count: AtomicU32::new(0),
        }
    }
}

fn fast_hash(host: &str) -> usize {
    // FNV-1a: fast, stable across runs, no external dependency needed for a
    // shard index that only has to be well-distributed, not cryptographic.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in host.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash as usize) % SHARD_COUNT
}

/// Sharded, durable per-host rate limiter.
pub struct RateLimiter {
    shards: Vec<Shard>,
    durable: Option<Arc<DurableStore>>,
}

impl RateLimiter {
    pub fn new(durable: Option<Arc<DurableStore>>) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Shard::new());
        }
        let limiter = Self { shards, durable };
        limiter.load_from_durable();
        limiter
    }

    fn load_from_durable(&self) {
        let Some(durable) = &self.durable else {
            return;
        };
        if let Ok(rows) = durable.ratelimit_load_all() {
            for row in rows {
                if let Some(shard) = self.shards.get(row.shard_key as usize) {
                    shard.timestamp_nanos.store(row.timestamp_nanos, Ordering::Relaxed);
                    shard.failure_count.store(row.failure_count, Ordering::Relaxed);
                }
            }
        }
    }

    fn shard(&self, host: &str) -> (&Shard, u32) {
        let idx = fast_hash(host);
        (&self.shards[idx], idx as u32)
    }

    fn minimum_gap(failures: u32) -> StdDuration {
        let penalty = (failures as u64 * FAILURE_PENALTY_MILLIS).min(MAX_FAILURE_PENALTY_MILLIS);
        StdDuration::from_millis(BASE_GAP_MILLIS + penalty)
    }

    /// Blocks until the minimum gap since the shard's last request has
    /// elapsed, then publishes a fresh timestamp.
    pub async fn wait_for_host(&self, host: &str) {
        let (shard, shard_key) = self.shard(host);
        let failures = shard.failure_count.load(Ordering::Relaxed);
        let gap = Self::minimum_gap(failures);

        loop {
            let now_nanos = now_nanos();
            let last = shard.timestamp_nanos.load(Ordering::Relaxed);
            let elapsed_nanos = now_nanos.saturating_sub(last);
            let gap_nanos = gap.as_nanos() as i64;

            if elapsed_nanos >= gap_nanos {
                break;
            }
            let remaining = StdDuration::from_nanos((gap_nanos - elapsed_nanos) as u64);
            tokio::time::sleep(remaining).await;
        }

        let published = now_nanos();
        shard.timestamp_nanos.store(published, Ordering::Relaxed);
        self.persist(shard_key, shard);
    }

    /// Non-blocking check: would `wait_for_host` return immediately right
    /// now?
    pub fn can_request_now(&self, host: &str) -> bool {
        let (shard, _) = self.shard(host);
        let failures = shard.failure_count.load(Ordering::Relaxed);
        let gap = Self::minimum_gap(failures);
        let elapsed = now_nanos().saturating_sub(shard.timestamp_nanos.load(Ordering::Relaxed));
        elapsed >= gap.as_nanos() as i64
    }

    pub fn record_success(&self, host: &str) {
        let (shard, shard_key) = self.shard(host);
        shard.failure_count.store(0, Ordering::Relaxed);
        self.persist(shard_key, shard);
    }

    pub fn record_failure(&self, host: &str) {
        let (shard, shard_key) = self.shard(host);
        shard.failure_count.fetch_add(1, Ordering::Relaxed);
        self.persist(shard_key, shard);
    }

    /// Current consecutive-failure count for a host's shard, used by the
    /// fetcher to decide when to temporarily blacklist a host.
    pub fn failure_count(&self, host: &str) -> u32 {
        let (shard, _) = self.shard(host);
        shard.failure_count.load(Ordering::Relaxed)
    }

    /// Sets the shard's stored timestamp into the future, so that no
    /// request to any host sharing it is released until that time passes.
    pub fn throttle_host(&self, host: &str, seconds: u64) {
        let (shard, shard_key) = self.shard(host);
        let until = now_nanos() + (seconds as i64 * 1_000_000_000);
        shard.timestamp_nanos.store(until, Ordering::Relaxed);
        self.persist(shard_key, shard);
    }

    fn persist(&self, shard_key: u32, shard: &Shard) {
        if let Some(durable) = &self.durable {
            let row = RateLimitRow {
                shard_key,
                timestamp_nanos: shard.timestamp_nanos.load(Ordering::Relaxed),
                failure_count: shard.failure_count.load(Ordering::Relaxed),
            };
            let _ = durable.ratelimit_upsert_batch(&[row]);
        }
    }
}

fn now_nanos() -> i64 {
    Utc::now()
        .signed_duration_since(DateTime::<Utc>::UNIX_EPOCH)
        .num_nanoseconds()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_hash_is_deterministic_and_in_range() {
        let a = fast_hash("example.com");
        let b = fast_hash("example.com");
        assert_eq!(a, b);
        assert!(a < SHARD_COUNT);
    }

    #[test]
    fn can_request_now_true_before_any_request() {
        let limiter = RateLimiter::new(None);
        assert!(limiter.can_request_now("example.com"));
    }

    #[tokio::test]
    async fn wait_for_host_enforces_minimum_gap() {
        let limiter = RateLimiter::new(None);
        limiter.wait_for_host("example.com").await;
        assert!(!limiter.can_request_now("example.com"));
    }

    #[tokio::test]
    async fn throttle_host_blocks_until_elapsed() {
        let limiter = RateLimiter::new(None);
        limiter.throttle_host("example.com", 1);
        assert!(!limiter.can_request_now("example.com"));
        tokio::time::sleep(StdDuration::from_millis(1100)).await;
        assert!(limiter.can_request_now("example.com"));
    }

    #[test]
    fn record_failure_grows_gap_and_record_success_resets_it() {
        let limiter = RateLimiter::new(None);
        for _ in 0..5 {
            limiter.record_failure("example.com");
        }
        let (shard, _) = limiter.shard("example.com");
        assert_eq!(shard.failure_count.load(Ordering::Relaxed), 5);
        limiter.record_success("example.com");
        assert_eq!(shard.failure_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn persists_and_reloads_through_durable_store() {
        let durable = Arc::new(crate::store::DurableStore::open_in_memory().unwrap());
        {
            let limiter = RateLimiter::new(Some(durable.clone()));
            limiter.throttle_host("example.com", 30);
        }
        let reloaded = RateLimiter::new(Some(durable));
        assert!(!reloaded.can_request_now("example.com"));
    }
}
