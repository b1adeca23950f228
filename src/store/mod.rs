//! Shared counter store used as the source of truth for rate-limit counts.
//!
//! Only four primitives are assumed: `INCR`, `EXPIRE`, `GET` and `SET`.
//! There are no transactions or scripts, so a caller that needs
//! increment-then-expire gets two separate round trips.
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;

use crate::error::Result;

#[async_trait]
pub trait CounterStore: Send + Sync + Debug {
    /// Atomically add one to `key` (absent counts as 0) and return the new value
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Set a time-to-live on `key`. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Read `key`; `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<i64>>;

    /// Overwrite `key`, clearing any time-to-live
    async fn set(&self, key: &str, value: i64) -> Result<()>;

    /// Housekeeping hook run from the service loop
    async fn expire_keys(&self) -> Result<()> {
        Ok(())
    }
}
