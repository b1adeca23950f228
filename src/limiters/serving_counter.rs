//! Per-caller serving counter with epoch reset, kept in a shared store.
//!
//! Order of operations for one request:
//!
//! 1. derive the key from the caller's uid and the instance qualifier
//! 2. `INCR` the key (unconditionally; this is the only point of truth)
//! 3. if the new count is 1, `EXPIRE` the key after one epoch
//! 4. allow when `count <= quota`
//!
//! Steps 2 and 3 are separate round trips. If the process dies between them
//! the key has no TTL and keeps counting until the next `reset_all` or until
//! a later first-of-epoch increment arms it. Concurrent first increments are
//! fine: only one of them sees count 1, so the TTL is set once and the epoch
//! starts at the earliest increment.
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::network::CallerRecord;
use crate::settings::{RateLimitSettings, StoreFailurePolicy};
use crate::store::CounterStore;

/// Result of one rate-limit check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateDecision {
    Allowed { count: i64, quota: u32 },
    Denied { count: i64, quota: u32 },
    /// The store failed and the failure policy decided
    Degraded { allowed: bool },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        match self {
            RateDecision::Allowed { .. } => true,
            RateDecision::Denied { .. } => false,
            RateDecision::Degraded { allowed } => *allowed,
        }
    }

    pub fn count(&self) -> Option<i64> {
        match self {
            RateDecision::Allowed { count, .. } | RateDecision::Denied { count, .. } => {
                Some(*count)
            }
            RateDecision::Degraded { .. } => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub reset: usize,
    pub failed: usize,
}

/// Build the counter key for `uid`
pub fn counter_key(format: &str, uid: u16, qualifier: &str) -> String {
    let base = format.replace("{uid}", &uid.to_string());
    if qualifier.is_empty() {
        base
    } else {
        format!("{}:{}", base, qualifier)
    }
}

#[derive(Clone, Debug)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    settings: RateLimitSettings,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, settings: RateLimitSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    pub fn epoch_length(&self) -> Duration {
        self.settings.epoch_length()
    }

    pub fn key_for(&self, record: &CallerRecord) -> String {
        counter_key(
            &self.settings.counter_key_format,
            record.uid,
            &self.settings.counter_key_qualifier,
        )
    }

    /// Count this request against the caller's quota and decide.
    ///
    /// Store errors are returned to the caller.
    pub async fn try_check_and_record(&self, record: &CallerRecord) -> Result<RateDecision> {
        let key = self.key_for(record);
        let count = self.store.incr(&key).await?;

        if count == 1 {
            // The key keeps counting if this fails; the next decision still
            // works, the epoch just does not end on time.
            if let Err(e) = self.store.expire(&key, self.epoch_length()).await {
                warn!("Failed to arm epoch expiry for {}: {}", key, e);
            }
        }

        if count <= i64::from(record.quota) {
            debug!("Rate limit: {} {}/{}", key, count, record.quota);
            Ok(RateDecision::Allowed {
                count,
                quota: record.quota,
            })
        } else {
            info!("Rate limit exceeded for {} ({}/{})", key, count, record.quota);
            Ok(RateDecision::Denied {
                count,
                quota: record.quota,
            })
        }
    }

    /// Like `try_check_and_record`, with store errors resolved by the
    /// configured `StoreFailurePolicy`.
    pub async fn check_and_record(&self, record: &CallerRecord) -> RateDecision {
        match self.try_check_and_record(record).await {
            Ok(decision) => decision,
            Err(e) => {
                let allowed = self.settings.store_failure_policy == StoreFailurePolicy::FailOpen;
                warn!(
                    "Counter store unavailable for uid {} ({}), {} request",
                    record.uid,
                    e,
                    if allowed { "allowing" } else { "denying" }
                );
                RateDecision::Degraded { allowed }
            }
        }
    }

    /// Current count in this epoch; 0 when no counter exists
    pub async fn current_count(&self, record: &CallerRecord) -> Result<i64> {
        Ok(self.store.get(&self.key_for(record)).await?.unwrap_or(0))
    }

    /// Zero the counters of every given caller.
    ///
    /// Increments that land while this runs may be overwritten.
    pub async fn reset_all<'a, I>(&self, records: I) -> ResetSummary
    where
        I: IntoIterator<Item = &'a CallerRecord>,
    {
        let mut summary = ResetSummary::default();
        for record in records {
            let key = self.key_for(record);
            match self.store.set(&key, 0).await {
                Ok(()) => summary.reset += 1,
                Err(e) => {
                    warn!("Failed to reset counter {}: {}", key, e);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "Reset {} serving counters ({} failed)",
            summary.reset, summary.failed
        );
        summary
    }
}
