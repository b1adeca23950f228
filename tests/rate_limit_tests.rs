//! Integration tests for the serving counter rate limiter
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use condense_miner::clock::ManualClock;
use condense_miner::error::{MinerError, Result};
use condense_miner::limiters::{RateDecision, RateLimiter};
use condense_miner::network::CallerRecord;
use condense_miner::settings::{RateLimitSettings, StoreFailurePolicy};
use condense_miner::store::{CounterStore, MemoryCounterStore};

fn record(uid: u16, quota: u32) -> CallerRecord {
    CallerRecord {
        hotkey: format!("caller-{}", uid),
        uid,
        stake: 20_000.0,
        quota,
        incentive: 0.0,
    }
}

fn settings(epoch_length_seconds: u64) -> RateLimitSettings {
    RateLimitSettings {
        epoch_length_seconds,
        counter_key_qualifier: "miner-hotkey".to_string(),
        ..RateLimitSettings::default()
    }
}

/// Wraps a store and counts how often each primitive is called
#[derive(Debug, Default)]
struct CountingStore {
    inner: MemoryCounterStore,
    incrs: AtomicUsize,
    expires: AtomicUsize,
}

#[async_trait]
impl CounterStore for CountingStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        self.incrs.fetch_add(1, Ordering::SeqCst);
        self.inner.incr(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.expires.fetch_add(1, Ordering::SeqCst);
        self.inner.expire(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.inner.set(key, value).await
    }
}

/// A store whose every call fails, like an unreachable Redis
#[derive(Debug, Default)]
struct DownStore;

#[async_trait]
impl CounterStore for DownStore {
    async fn incr(&self, _key: &str) -> Result<i64> {
        Err(MinerError::Store("connection refused".into()))
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
        Err(MinerError::Store("connection refused".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<i64>> {
        Err(MinerError::Store("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: i64) -> Result<()> {
        Err(MinerError::Store("connection refused".into()))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_admit_exactly_quota() {
    let quota = 25;
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::default()), settings(600));
    let caller = record(7, quota);

    let mut rng = rand::thread_rng();
    let mut handles = Vec::new();
    for _ in 0..100 {
        let limiter = limiter.clone();
        let caller = caller.clone();
        let jitter = Duration::from_micros(rng.gen_range(0..2_000));
        handles.push(tokio::spawn(async move {
            tokio::time::sleep(jitter).await;
            limiter.check_and_record(&caller).await
        }));
    }

    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap().is_allowed() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, quota as usize);
    assert_eq!(limiter.current_count(&caller).await.unwrap(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_increments_arm_expiry_once() {
    let store = Arc::new(CountingStore::default());
    let limiter = RateLimiter::new(store.clone(), settings(600));
    let caller = record(1, 10);

    let a = {
        let (limiter, caller) = (limiter.clone(), caller.clone());
        tokio::spawn(async move { limiter.check_and_record(&caller).await })
    };
    let b = {
        let (limiter, caller) = (limiter.clone(), caller.clone());
        tokio::spawn(async move { limiter.check_and_record(&caller).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    let mut counts = vec![a.count().unwrap(), b.count().unwrap()];
    counts.sort();
    assert_eq!(counts, vec![1, 2]);
    assert_eq!(store.incrs.load(Ordering::SeqCst), 2);
    assert_eq!(store.expires.load(Ordering::SeqCst), 1);
    let ttl = store.inner.ttl(&limiter.key_for(&caller)).unwrap();
    assert!(ttl > Duration::from_secs(590) && ttl <= Duration::from_secs(600));
}

#[tokio::test]
async fn test_epoch_expiry_restarts_count() {
    let clock = ManualClock::new(1_000);
    let store = Arc::new(MemoryCounterStore::new(Arc::new(clock.clone())));
    let limiter = RateLimiter::new(store, settings(60));
    let caller = record(3, 2);

    assert!(limiter.check_and_record(&caller).await.is_allowed());
    clock.advance(Duration::from_secs(30));
    assert!(limiter.check_and_record(&caller).await.is_allowed());
    assert!(!limiter.check_and_record(&caller).await.is_allowed());

    // The epoch runs from the first increment, not the last
    clock.advance(Duration::from_secs(31));
    assert_eq!(
        limiter.check_and_record(&caller).await,
        RateDecision::Allowed { count: 1, quota: 2 }
    );
}

#[tokio::test]
async fn test_denied_requests_still_consume_quota() {
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::default()), settings(600));
    let caller = record(4, 1);

    assert!(limiter.check_and_record(&caller).await.is_allowed());
    for expected in 2..=4 {
        assert_eq!(
            limiter.check_and_record(&caller).await,
            RateDecision::Denied {
                count: expected,
                quota: 1
            }
        );
    }
}

#[tokio::test]
async fn test_reset_all_zeroes_every_counter() {
    let limiter = RateLimiter::new(Arc::new(MemoryCounterStore::default()), settings(600));
    let callers: Vec<CallerRecord> = (0..5).map(|uid| record(uid, 3)).collect();

    for caller in &callers {
        for _ in 0..3 {
            limiter.check_and_record(caller).await;
        }
        assert!(!limiter.check_and_record(caller).await.is_allowed());
    }

    let summary = limiter.reset_all(callers.iter()).await;
    assert_eq!(summary.reset, 5);
    assert_eq!(summary.failed, 0);

    for caller in &callers {
        assert_eq!(limiter.current_count(caller).await.unwrap(), 0);
        assert!(limiter.check_and_record(caller).await.is_allowed());
    }

    // Idempotent
    let again = limiter.reset_all(callers.iter()).await;
    assert_eq!(again.reset, 5);
}

#[tokio::test]
async fn test_store_failure_policies() {
    let caller = record(9, 100);

    let closed = RateLimiter::new(Arc::new(DownStore), settings(600));
    assert_eq!(
        closed.check_and_record(&caller).await,
        RateDecision::Degraded { allowed: false }
    );
    assert!(closed.try_check_and_record(&caller).await.is_err());

    let open = RateLimiter::new(
        Arc::new(DownStore),
        RateLimitSettings {
            store_failure_policy: StoreFailurePolicy::FailOpen,
            ..settings(600)
        },
    );
    assert_eq!(
        open.check_and_record(&caller).await,
        RateDecision::Degraded { allowed: true }
    );

    let summary = open.reset_all([caller.clone(), record(10, 1)].iter()).await;
    assert_eq!(summary.reset, 0);
    assert_eq!(summary.failed, 2);
}

#[tokio::test]
async fn test_instances_with_different_qualifiers_count_separately() {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::default());
    let first = RateLimiter::new(store.clone(), settings(600));
    let second = RateLimiter::new(
        store,
        RateLimitSettings {
            counter_key_qualifier: "other-miner".to_string(),
            ..settings(600)
        },
    );
    let caller = record(2, 1);

    assert!(first.check_and_record(&caller).await.is_allowed());
    assert!(second.check_and_record(&caller).await.is_allowed());
    assert!(!first.check_and_record(&caller).await.is_allowed());
    assert_eq!(first.key_for(&caller), "serving_counter:2:miner-hotkey");
    assert_eq!(second.key_for(&caller), "serving_counter:2:other-miner");
}
