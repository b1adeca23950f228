//! In-process counter store with Redis semantics.
//!
//! Suitable for a single serving instance and for tests. Entries live in a
//! lock-free `papaya::HashMap`; every mutation is a single atomic
//! compare-and-swap on one key, so `incr` is linearizable per key.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use papaya::HashMap;

use super::CounterStore;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    value: i64,
    /// Unix millis after which the entry reads as absent
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: HashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remaining time-to-live for `key`, if it has one
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        self.entries
            .pin()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .and_then(|e| e.expires_at)
            .map(|at| Duration::from_millis((at - now).max(0) as u64))
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.pin().retain(|_k, e| !e.is_expired(now));
        before.saturating_sub(self.entries.len())
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        let now = self.clock.now_millis();
        let entries = self.entries.pin();
        let entry = entries.update_or_insert_with(
            key.to_string(),
            |e| {
                if e.is_expired(now) {
                    Entry {
                        value: 1,
                        expires_at: None,
                    }
                } else {
                    Entry {
                        value: e.value + 1,
                        expires_at: e.expires_at,
                    }
                }
            },
            || Entry {
                value: 1,
                expires_at: None,
            },
        );
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = self.clock.now_millis();
        let deadline = now + ttl.as_millis() as i64;
        let entries = self.entries.pin();
        let updated = entries.update(key.to_string(), |e| {
            if e.is_expired(now) {
                e.clone()
            } else {
                Entry {
                    value: e.value,
                    expires_at: Some(deadline),
                }
            }
        });
        Ok(updated.is_some_and(|e| e.expires_at == Some(deadline)))
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let now = self.clock.now_millis();
        Ok(self
            .entries
            .pin()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value))
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        self.entries.pin().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn expire_keys(&self) -> Result<()> {
        let purged = self.purge_expired();
        if purged > 0 {
            tracing::debug!("Purged {} expired counters", purged);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (MemoryCounterStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (MemoryCounterStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn incr_starts_at_one() {
        let (store, _clock) = store_with_clock();
        assert_eq!(store.incr("a").await.unwrap(), 1);
        assert_eq!(store.incr("a").await.unwrap(), 2);
        assert_eq!(store.incr("b").await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), Some(2));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_key_reads_absent_and_restarts() {
        let (store, clock) = store_with_clock();
        store.incr("a").await.unwrap();
        store.incr("a").await.unwrap();
        assert!(store.expire("a", Duration::from_secs(60)).await.unwrap());
        clock.advance(Duration::from_secs(59));
        assert_eq!(store.get("a").await.unwrap(), Some(2));
        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.incr("a").await.unwrap(), 1);
        // a fresh counter carries no ttl until someone sets it
        assert_eq!(store.ttl("a"), None);
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_noop() {
        let (store, _clock) = store_with_clock();
        assert!(!store.expire("nope", Duration::from_secs(1)).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_clears_ttl() {
        let (store, clock) = store_with_clock();
        store.incr("a").await.unwrap();
        store.expire("a", Duration::from_secs(10)).await.unwrap();
        store.set("a", 0).await.unwrap();
        assert_eq!(store.ttl("a"), None);
        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.get("a").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let (store, clock) = store_with_clock();
        store.incr("old").await.unwrap();
        store.expire("old", Duration::from_secs(1)).await.unwrap();
        store.incr("new").await.unwrap();
        clock.advance(Duration::from_secs(2));
        store.expire_keys().await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("new").await.unwrap(), Some(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_incr_loses_no_updates() {
        let store = Arc::new(MemoryCounterStore::default());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..250 {
                    store.incr("shared").await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get("shared").await.unwrap(), Some(2000));
    }
}
