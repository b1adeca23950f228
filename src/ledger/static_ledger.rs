//! Ledger held in memory; the contents are set by the owner.
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Ledger, Metagraph, NeuronInfo, Registration};
use crate::error::{MinerError, Result};

#[derive(Debug, Default)]
struct Inner {
    metagraph: Metagraph,
    failure: Option<String>,
}

/// Clones share state, so a test can keep a handle and change the ledger
/// under a running service.
#[derive(Clone, Debug, Default)]
pub struct StaticLedger {
    inner: Arc<RwLock<Inner>>,
}

impl StaticLedger {
    pub fn new(block: u64, neurons: Vec<NeuronInfo>) -> Self {
        let ledger = Self::default();
        ledger.set_metagraph(Metagraph { block, neurons });
        ledger
    }

    pub fn set_metagraph(&self, metagraph: Metagraph) {
        if let Ok(mut inner) = self.inner.write() {
            inner.metagraph = metagraph;
        }
    }

    /// Make every call fail with `message` until `recover` is called
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failure = Some(message.to_string());
        }
    }

    pub fn recover(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.failure = None;
        }
    }

    fn read(&self) -> Result<Metagraph> {
        let inner = self
            .inner
            .read()
            .map_err(|e| MinerError::Concurrency(format!("ledger lock poisoned: {}", e)))?;
        match &inner.failure {
            Some(message) => Err(MinerError::Ledger(message.clone())),
            None => Ok(inner.metagraph.clone()),
        }
    }
}

#[async_trait]
impl Ledger for StaticLedger {
    async fn list_registered_identities(&self) -> Result<Vec<Registration>> {
        Ok(self
            .read()?
            .neurons
            .into_iter()
            .map(|n| Registration {
                hotkey: n.hotkey,
                uid: n.uid,
            })
            .collect())
    }

    async fn get_stake(&self, hotkey: &str) -> Result<f64> {
        self.read()?
            .neurons
            .into_iter()
            .find(|n| n.hotkey == hotkey)
            .map(|n| n.stake)
            .ok_or_else(|| crate::ledger_error!("unknown hotkey {}", hotkey))
    }

    async fn current_block(&self) -> Result<u64> {
        Ok(self.read()?.block)
    }

    async fn metagraph(&self) -> Result<Metagraph> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neuron(hotkey: &str, uid: u16, stake: f64) -> NeuronInfo {
        NeuronInfo {
            hotkey: hotkey.to_string(),
            uid,
            stake,
            incentive: 0.0,
        }
    }

    #[tokio::test]
    async fn serves_registrations_and_stakes() {
        let ledger = StaticLedger::new(10, vec![neuron("a", 0, 5.0), neuron("b", 1, 7.5)]);
        let regs = ledger.list_registered_identities().await.unwrap();
        assert_eq!(regs.len(), 2);
        assert_eq!(ledger.get_stake("b").await.unwrap(), 7.5);
        assert!(ledger.get_stake("zzz").await.is_err());
        assert_eq!(ledger.current_block().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn failure_toggle_is_shared_between_clones() {
        let ledger = StaticLedger::new(1, vec![neuron("a", 0, 1.0)]);
        let handle = ledger.clone();
        handle.fail_with("timeout");
        assert!(matches!(
            ledger.metagraph().await,
            Err(MinerError::Ledger(msg)) if msg == "timeout"
        ));
        handle.recover();
        assert_eq!(ledger.metagraph().await.unwrap().neurons.len(), 1);
    }
}
