//! Read-only view of the ledger: who is registered, with what stake.
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod sidecar;
pub mod static_ledger;

pub use sidecar::SidecarLedger;
pub use static_ledger::StaticLedger;

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub hotkey: String,
    pub uid: u16,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuronInfo {
    pub hotkey: String,
    pub uid: u16,
    pub stake: f64,
    #[serde(default)]
    pub incentive: f64,
}

/// Everything one refresh needs, fetched together
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metagraph {
    pub block: u64,
    pub neurons: Vec<NeuronInfo>,
}

#[async_trait]
pub trait Ledger: Send + Sync + Debug {
    async fn list_registered_identities(&self) -> Result<Vec<Registration>>;

    async fn get_stake(&self, hotkey: &str) -> Result<f64>;

    async fn current_block(&self) -> Result<u64>;

    /// Registrations joined with stakes.
    ///
    /// The default makes one stake lookup per registration; implementations
    /// with a bulk endpoint should override it.
    async fn metagraph(&self) -> Result<Metagraph> {
        let block = self.current_block().await?;
        let registrations = self.list_registered_identities().await?;
        let mut neurons = Vec::with_capacity(registrations.len());
        for reg in registrations {
            let stake = self.get_stake(&reg.hotkey).await?;
            neurons.push(NeuronInfo {
                hotkey: reg.hotkey,
                uid: reg.uid,
                stake,
                incentive: 0.0,
            });
        }
        Ok(Metagraph { block, neurons })
    }
}
