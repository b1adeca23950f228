//! Network-state snapshot: hotkey -> caller record, swapped whole on refresh.
//!
//! A snapshot is never mutated after it is built. Refresh builds a new one
//! and replaces the `Arc` under a short write lock, so readers see either
//! the old mapping or the new one and never a mix. A failed refresh leaves
//! the current snapshot in place.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::quota::QuotaPolicy;
use crate::clock::{Clock, SystemClock};
use crate::error::{MinerError, Result};
use crate::ledger::{Ledger, Metagraph};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallerRecord {
    pub hotkey: String,
    pub uid: u16,
    pub stake: f64,
    pub quota: u32,
    pub incentive: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkSnapshot {
    records: HashMap<String, CallerRecord>,
    pub block: u64,
    pub total_stake: f64,
    /// Unix millis when this snapshot was built; 0 for the empty startup snapshot
    pub refreshed_at_ms: i64,
}

impl NetworkSnapshot {
    /// Build a snapshot from a ledger response, rejecting malformed data.
    pub fn from_metagraph(
        metagraph: Metagraph,
        policy: &QuotaPolicy,
        refreshed_at_ms: i64,
    ) -> Result<Self> {
        let mut seen_uids = HashSet::with_capacity(metagraph.neurons.len());
        for neuron in &metagraph.neurons {
            if neuron.hotkey.is_empty() {
                return Err(crate::ledger_error!(
                    "malformed metagraph: empty hotkey at uid {}",
                    neuron.uid
                ));
            }
            if !neuron.stake.is_finite() || neuron.stake < 0.0 {
                return Err(crate::ledger_error!(
                    "malformed metagraph: invalid stake {} for {}",
                    neuron.stake, neuron.hotkey
                ));
            }
            if !seen_uids.insert(neuron.uid) {
                return Err(crate::ledger_error!(
                    "malformed metagraph: duplicate uid {}",
                    neuron.uid
                ));
            }
        }

        let total_stake: f64 = metagraph.neurons.iter().map(|n| n.stake).sum();
        let mut records = HashMap::with_capacity(metagraph.neurons.len());
        for neuron in metagraph.neurons {
            let record = CallerRecord {
                quota: policy.quota_for(neuron.stake, total_stake),
                hotkey: neuron.hotkey.clone(),
                uid: neuron.uid,
                stake: neuron.stake,
                incentive: neuron.incentive,
            };
            if records.insert(neuron.hotkey.clone(), record).is_some() {
                return Err(crate::ledger_error!(
                    "malformed metagraph: duplicate hotkey {}",
                    neuron.hotkey
                ));
            }
        }

        Ok(Self {
            records,
            block: metagraph.block,
            total_stake,
            refreshed_at_ms,
        })
    }

    pub fn lookup(&self, hotkey: &str) -> Option<&CallerRecord> {
        self.records.get(hotkey)
    }

    pub fn records(&self) -> impl Iterator<Item = &CallerRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// uid -> quota, used to tell whether a refresh changed any quota
    fn quota_table(&self) -> HashMap<u16, u32> {
        self.records.values().map(|r| (r.uid, r.quota)).collect()
    }

    /// Records in `self` whose serving counter must not carry over from
    /// `previous`: the quota went up, or the uid now belongs to another
    /// hotkey. A uid that was not registered before counts as a new occupant
    /// unless `previous` is the empty startup snapshot.
    fn stale_counters(&self, previous: &NetworkSnapshot) -> Vec<CallerRecord> {
        let before: HashMap<u16, &CallerRecord> =
            previous.records.values().map(|r| (r.uid, r)).collect();
        let mut stale: Vec<CallerRecord> = self
            .records
            .values()
            .filter(|r| match before.get(&r.uid) {
                Some(old) => old.hotkey != r.hotkey || r.quota > old.quota,
                None => !previous.is_empty(),
            })
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.uid);
        stale
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RefreshOutcome {
    Refreshed {
        block: u64,
        callers: usize,
        quotas_changed: bool,
        /// Callers whose counters should be zeroed
        reset: Vec<CallerRecord>,
    },
    /// Another refresh was already running
    Skipped,
}

#[derive(Debug)]
pub struct NetworkSnapshotHandle {
    current: RwLock<Arc<NetworkSnapshot>>,
    policy: QuotaPolicy,
    refresh_guard: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl NetworkSnapshotHandle {
    pub fn new(policy: QuotaPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    pub fn with_clock(policy: QuotaPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            current: RwLock::new(Arc::new(NetworkSnapshot::default())),
            policy,
            refresh_guard: Mutex::new(()),
            clock,
        }
    }

    /// The snapshot in force right now
    pub fn current(&self) -> Arc<NetworkSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            // A writer only ever swaps an Arc, so the value behind a poisoned
            // lock is still a complete snapshot.
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn lookup(&self, hotkey: &str) -> Option<CallerRecord> {
        self.current().lookup(hotkey).cloned()
    }

    pub fn records(&self) -> Vec<CallerRecord> {
        self.current().records().cloned().collect()
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    /// Fetch from the ledger and swap in a new snapshot.
    ///
    /// Returns `Skipped` without touching the ledger if a refresh is already
    /// in flight.
    pub async fn refresh(&self, ledger: &dyn Ledger) -> Result<RefreshOutcome> {
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            debug!("Snapshot refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        let metagraph = ledger.metagraph().await.map_err(|e| {
            warn!("Ledger fetch failed, keeping snapshot: {}", e);
            e
        })?;
        let next = NetworkSnapshot::from_metagraph(metagraph, &self.policy, self.clock.now_millis())
            .map_err(|e| {
                warn!("Rejected ledger response, keeping snapshot: {}", e);
                e
            })?;

        let previous = self.current();
        let quotas_changed = previous.quota_table() != next.quota_table();
        let reset = next.stale_counters(&previous);
        let (block, callers) = (next.block, next.len());
        self.install(next)?;
        info!(
            "Snapshot refreshed at block {} ({} callers, quotas changed: {}, {} counters to reset)",
            block,
            callers,
            quotas_changed,
            reset.len()
        );
        Ok(RefreshOutcome::Refreshed {
            block,
            callers,
            quotas_changed,
            reset,
        })
    }

    /// Replace the current snapshot
    pub fn install(&self, snapshot: NetworkSnapshot) -> Result<()> {
        let mut guard = self
            .current
            .write()
            .map_err(|e| MinerError::Concurrency(format!("snapshot lock poisoned: {}", e)))?;
        *guard = Arc::new(snapshot);
        Ok(())
    }
}
