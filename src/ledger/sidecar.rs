//! HTTP client for the ledger sidecar.
//!
//! The sidecar is a small service next to the miner that talks to the chain
//! and answers with JSON:
//!
//! * `GET /metagraph/{netuid}` -> `{"block": u64, "neurons": [{hotkey, uid, stake, incentive}]}`
//! * `GET /registrations/{netuid}` -> `[{hotkey, uid}]`
//! * `GET /stake/{netuid}/{hotkey}` -> `{"stake": f64}`
//! * `GET /block` -> `{"block": u64}`
//!
//! Every request carries `?network=<name>`.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Ledger, Metagraph, Registration};
use crate::error::Result;
use crate::settings::LedgerSettings;

#[derive(Clone, Debug)]
pub struct SidecarLedger {
    client: reqwest::Client,
    base_url: String,
    netuid: u16,
    network: String,
}

#[derive(Deserialize)]
struct StakeResponse {
    stake: f64,
}

#[derive(Deserialize)]
struct BlockResponse {
    block: u64,
}

impl SidecarLedger {
    pub fn new(settings: &LedgerSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| crate::config_error!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: settings.sidecar_url.trim_end_matches('/').to_string(),
            netuid: settings.netuid,
            network: settings.network.clone(),
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[("network", self.network.as_str())])
            .send()
            .await
            .map_err(|e| crate::ledger_error!("request to {} failed: {}", url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(crate::ledger_error!(
                "{} answered with status {}",
                url,
                status.as_u16()
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| crate::ledger_error!("malformed response from {}: {}", url, e))
    }
}

#[async_trait]
impl Ledger for SidecarLedger {
    async fn list_registered_identities(&self) -> Result<Vec<Registration>> {
        self.fetch(&format!("/registrations/{}", self.netuid)).await
    }

    async fn get_stake(&self, hotkey: &str) -> Result<f64> {
        let resp: StakeResponse = self
            .fetch(&format!("/stake/{}/{}", self.netuid, hotkey))
            .await?;
        Ok(resp.stake)
    }

    async fn current_block(&self) -> Result<u64> {
        let resp: BlockResponse = self.fetch("/block").await?;
        Ok(resp.block)
    }

    async fn metagraph(&self) -> Result<Metagraph> {
        self.fetch(&format!("/metagraph/{}", self.netuid)).await
    }
}
