//! Admission control: one accept/reject decision per inbound request.
//!
//! Checks run in order and stop at the first rejection:
//!
//! 1. caller must be in the current snapshot ("unregistered")
//! 2. caller stake must reach the minimum ("stake too low")
//! 3. the serving counter must stay within quota ("rate limit exceeded")
//!
//! Only step 3 touches the counter store, and it consumes one unit of quota
//! whether it allows or denies.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::limiters::{RateDecision, RateLimiter};
use crate::network::{CallerRecord, NetworkSnapshotHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    Unregistered,
    StakeTooLow,
    RateLimitExceeded,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Unregistered => "unregistered",
            RejectReason::StakeTooLow => "stake too low",
            RejectReason::RateLimitExceeded => "rate limit exceeded",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AdmissionDecision {
    Admit {
        record: CallerRecord,
        rate: RateDecision,
    },
    Reject(RejectReason),
}

impl AdmissionDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionDecision::Admit { .. })
    }

    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AdmissionDecision::Reject(reason) => Some(*reason),
            AdmissionDecision::Admit { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AdmissionController {
    snapshot: Arc<NetworkSnapshotHandle>,
    rate_limiter: RateLimiter,
    min_stake: f64,
}

impl AdmissionController {
    pub fn new(
        snapshot: Arc<NetworkSnapshotHandle>,
        rate_limiter: RateLimiter,
        min_stake: f64,
    ) -> Self {
        Self {
            snapshot,
            rate_limiter,
            min_stake,
        }
    }

    pub fn min_stake(&self) -> f64 {
        self.min_stake
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn snapshot(&self) -> &Arc<NetworkSnapshotHandle> {
        &self.snapshot
    }

    pub async fn admit(&self, hotkey: &str) -> AdmissionDecision {
        let Some(record) = self.snapshot.lookup(hotkey) else {
            debug!("Rejecting {}: unregistered", hotkey);
            return AdmissionDecision::Reject(RejectReason::Unregistered);
        };

        if record.stake < self.min_stake {
            debug!(
                "Rejecting uid {}: stake {} below {}",
                record.uid, record.stake, self.min_stake
            );
            return AdmissionDecision::Reject(RejectReason::StakeTooLow);
        }

        let rate = self.rate_limiter.check_and_record(&record).await;
        if !rate.is_allowed() {
            return AdmissionDecision::Reject(RejectReason::RateLimitExceeded);
        }

        AdmissionDecision::Admit { record, rate }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{NeuronInfo, StaticLedger};
    use crate::network::QuotaPolicy;
    use crate::settings::RateLimitSettings;
    use crate::store::MemoryCounterStore;

    async fn controller(neurons: Vec<NeuronInfo>, quota: u32) -> AdmissionController {
        let snapshot = Arc::new(NetworkSnapshotHandle::new(QuotaPolicy::Fixed(quota)));
        snapshot
            .refresh(&StaticLedger::new(1, neurons))
            .await
            .unwrap();
        let rl = RateLimiter::new(
            Arc::new(MemoryCounterStore::default()),
            RateLimitSettings::default(),
        );
        AdmissionController::new(snapshot, rl, 10_000.0)
    }

    fn neuron(hotkey: &str, uid: u16, stake: f64) -> NeuronInfo {
        NeuronInfo {
            hotkey: hotkey.into(),
            uid,
            stake,
            incentive: 0.0,
        }
    }

    #[test]
    fn reason_strings() {
        assert_eq!(RejectReason::Unregistered.to_string(), "unregistered");
        assert_eq!(RejectReason::StakeTooLow.to_string(), "stake too low");
        assert_eq!(
            RejectReason::RateLimitExceeded.to_string(),
            "rate limit exceeded"
        );
    }

    #[tokio::test]
    async fn stake_exactly_at_minimum_is_admitted() {
        let ac = controller(vec![neuron("v", 0, 10_000.0)], 1).await;
        assert!(ac.admit("v").await.is_admitted());
        assert_eq!(
            ac.admit("v").await.reject_reason(),
            Some(RejectReason::RateLimitExceeded)
        );
    }

    #[tokio::test]
    async fn checks_run_in_order() {
        let ac = controller(vec![neuron("poor", 0, 1.0)], 0).await;
        // quota 0 would deny, but the stake check fires first
        assert_eq!(
            ac.admit("poor").await.reject_reason(),
            Some(RejectReason::StakeTooLow)
        );
        assert_eq!(
            ac.admit("ghost").await.reject_reason(),
            Some(RejectReason::Unregistered)
        );
    }
}
