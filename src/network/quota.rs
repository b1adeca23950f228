//! Stake -> quota assignment
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How many requests per epoch a caller may make, as a function of stake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QuotaPolicy {
    /// Every registered caller gets the same quota
    Fixed(u32),
    /// Quota proportional to the caller's share of total network stake
    StakeWeighted {
        /// Requests per epoch shared out across the whole network
        requests_per_epoch: u32,
        /// Floor applied after the proportional split
        min_quota: u32,
        max_quota: Option<u32>,
    },
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy::StakeWeighted {
            requests_per_epoch: 1000,
            min_quota: 1,
            max_quota: None,
        }
    }
}

impl QuotaPolicy {
    pub fn quota_for(&self, stake: f64, total_stake: f64) -> u32 {
        match *self {
            QuotaPolicy::Fixed(quota) => quota,
            QuotaPolicy::StakeWeighted {
                requests_per_epoch,
                min_quota,
                max_quota,
            } => {
                let share = if total_stake > 0.0 && stake.is_finite() && stake > 0.0 {
                    (stake / total_stake).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let proportional = (f64::from(requests_per_epoch) * share).floor() as u32;
                let quota = proportional.max(min_quota);
                match max_quota {
                    Some(cap) => quota.min(cap),
                    None => quota,
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let QuotaPolicy::StakeWeighted {
            min_quota,
            max_quota: Some(cap),
            ..
        } = self
        {
            if cap < min_quota {
                return Err(crate::config_error!(
                    "max quota {} is below min quota {}",
                    cap, min_quota
                ));
            }
        }
        Ok(())
    }
}
