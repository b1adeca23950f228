//! Redis-backed counter store.
//!
//! Counts survive process restarts and can be shared by several serving
//! instances. Uses `redis::aio::ConnectionManager`, which reconnects on its
//! own and is cheap to clone, so each call works on its own handle and
//! concurrent requests are pipelined over one multiplexed connection.
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use super::CounterStore;
use crate::error::Result;
use crate::settings::RedisSettings;

#[derive(Clone)]
pub struct RedisCounterStore {
    connection: ConnectionManager,
    url_redacted: String,
}

impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("url", &self.url_redacted)
            .finish_non_exhaustive()
    }
}

impl RedisCounterStore {
    /// Connect using a full `redis://` URL
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        let url_redacted = redact(url);
        info!("Connected to counter store at {}", url_redacted);
        Ok(Self {
            connection,
            url_redacted,
        })
    }

    pub async fn connect_with_settings(settings: &RedisSettings) -> Result<Self> {
        Self::connect(&settings.url()).await
    }
}

/// Hide credentials in a redis URL for logging
fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &url[..scheme_end + 3], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection.clone();
        let count: i64 = conn.incr(key, 1i64).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.connection.clone();
        let secs = ttl.as_secs().max(1) as i64;
        let applied: bool = conn.expire(key, secs).await?;
        Ok(applied)
    }

    async fn get(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.connection.clone();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: i64) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }
}
