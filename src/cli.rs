//! CLI for this application
//!
use std::time::Duration;

use crate::error::Result;
use crate::network::QuotaPolicy;
use crate::settings;
use crate::wallet;

pub use crate::settings::{APP_NAME, APP_VERSION};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum QuotaMode {
    Fixed,
    StakeWeighted,
}

#[derive(Clone, Debug, clap::Parser)]
#[command(name = "condense-miner", version)]
pub struct Cli {
    // Server listen address
    #[clap(
        long,
        default_value = "0.0.0.0",
        env("MINER_LISTEN_ADDRESS"),
        help = "IP Address to listen on"
    )]
    pub listen_address: String,

    // Axon (HTTP API) listen port
    #[clap(
        long,
        default_value = settings::DEFAULT_AXON_PORT,
        env("MINER_AXON_PORT"),
        help = "Port to bind the axon HTTP server to"
    )]
    pub axon_port: u16,

    // Identity
    #[clap(
        long,
        env("MINER_HOTKEY_ADDRESS"),
        help = "Our hotkey address. Read from the wallet when omitted"
    )]
    pub hotkey_address: Option<String>,

    #[clap(long, default_value = "default", env("MINER_WALLET_NAME"))]
    pub wallet_name: String,

    #[clap(long, default_value = "default", env("MINER_WALLET_HOTKEY"))]
    pub wallet_hotkey: String,

    #[clap(long, default_value = "~/.bittensor/wallets", env("MINER_WALLET_PATH"))]
    pub wallet_path: String,

    // Ledger
    #[clap(long, default_value = "47", env("MINER_NETUID"), help = "Subnet id")]
    pub netuid: u16,

    #[clap(long, default_value = "finney", env("MINER_SUBTENSOR_NETWORK"))]
    pub subtensor_network: String,

    #[clap(
        long,
        default_value = "http://localhost:9100",
        env("MINER_SIDECAR_URL"),
        help = "Base URL of the ledger sidecar"
    )]
    pub sidecar_url: String,

    #[clap(long, default_value = "30", env("MINER_LEDGER_TIMEOUT_SECS"))]
    pub ledger_timeout_secs: u64,

    // Counter store
    #[clap(
        long,
        default_value = "redis",
        env("MINER_COUNTER_STORE"),
        help = "counter store: 'redis' or 'memory'"
    )]
    pub counter_store: settings::CounterStoreKind,

    #[clap(long, default_value = "localhost", env("MINER_REDIS_HOST"))]
    pub redis_host: String,

    #[clap(long, default_value = "6379", env("MINER_REDIS_PORT"))]
    pub redis_port: u16,

    #[clap(long, default_value = "0", env("MINER_REDIS_DB"))]
    pub redis_db: i64,

    #[clap(long, env("MINER_REDIS_USERNAME"))]
    pub redis_username: Option<String>,

    #[clap(long, env("MINER_REDIS_PASSWORD"), hide_env_values = true)]
    pub redis_password: Option<String>,

    #[clap(
        long,
        default_value = settings::DEFAULT_COUNTER_KEY_FORMAT,
        env("MINER_COUNTER_KEY_FORMAT"),
        help = "Counter key template; {uid} is replaced by the caller uid"
    )]
    pub counter_key_format: String,

    #[clap(
        long,
        env("MINER_COUNTER_KEY_QUALIFIER"),
        help = "Suffix separating this instance's counters. Defaults to our hotkey"
    )]
    pub counter_key_qualifier: Option<String>,

    // Admission
    #[clap(
        long,
        default_value = "10000.0",
        env("MINER_MIN_STAKE"),
        help = "Callers with less stake are rejected"
    )]
    pub min_stake: f64,

    #[clap(
        long,
        default_value = "600",
        env("MINER_EPOCH_LENGTH"),
        help = "Seconds before a caller's request count resets"
    )]
    pub epoch_length: u64,

    #[clap(long, value_enum, default_value = "stake-weighted", env("MINER_QUOTA_MODE"))]
    pub quota_mode: QuotaMode,

    #[clap(long, default_value = "100", env("MINER_FIXED_QUOTA"))]
    pub fixed_quota: u32,

    #[clap(
        long,
        default_value = "1000",
        env("MINER_REQUESTS_PER_EPOCH"),
        help = "Requests per epoch split across callers by stake share"
    )]
    pub requests_per_epoch: u32,

    #[clap(long, default_value = "1", env("MINER_MIN_QUOTA"))]
    pub min_quota: u32,

    #[clap(long, env("MINER_MAX_QUOTA"))]
    pub max_quota: Option<u32>,

    #[clap(
        long,
        default_value = "fail-closed",
        env("MINER_STORE_FAILURE_POLICY"),
        help = "When the counter store is down: 'fail-closed' denies, 'fail-open' allows"
    )]
    pub store_failure_policy: settings::StoreFailurePolicy,

    // Service loop
    #[clap(long, default_value = "10", env("MINER_TICK_INTERVAL_SECS"))]
    pub tick_interval_secs: u64,

    #[clap(
        long,
        default_value = "10",
        env("MINER_REFRESH_EVERY_TICKS"),
        help = "Refresh the network snapshot every N ticks"
    )]
    pub refresh_every_ticks: u64,

    #[clap(long, default_value = "5", env("MINER_STARTUP_RETRIES"))]
    pub startup_retries: u32,

    // Compression
    #[clap(long, default_value = "0.7", env("MINER_COMPRESS_RATE"))]
    pub compress_rate: f32,

    #[clap(
        long,
        value_delimiter = ',',
        default_values_t = settings::default_forced_tokens(),
        env("MINER_FORCED_TOKENS")
    )]
    pub forced_tokens: Vec<String>,

    #[clap(long, default_value = "4", env("MINER_MAX_CONCURRENT_COMPRESSIONS"))]
    pub max_concurrent_compressions: usize,

    #[clap(
        long,
        default_value = "60",
        env("MINER_COMPRESSION_TIMEOUT_SECS"),
        help = "0 disables the timeout"
    )]
    pub compression_timeout_secs: u64,

    // Logging
    #[clap(long, env("MINER_LOG_JSON"), help = "Emit logs as JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn quota_policy(&self) -> QuotaPolicy {
        match self.quota_mode {
            QuotaMode::Fixed => QuotaPolicy::Fixed(self.fixed_quota),
            QuotaMode::StakeWeighted => QuotaPolicy::StakeWeighted {
                requests_per_epoch: self.requests_per_epoch,
                min_quota: self.min_quota,
                max_quota: self.max_quota,
            },
        }
    }

    /// Resolve the hotkey and build validated settings
    pub fn into_settings(self) -> Result<settings::Settings> {
        let hotkey = match &self.hotkey_address {
            Some(address) => address.clone(),
            None => {
                wallet::load_hotkey_address(&self.wallet_path, &self.wallet_name, &self.wallet_hotkey)?
            }
        };
        let quota_policy = self.quota_policy();
        let counter_key_qualifier = self
            .counter_key_qualifier
            .clone()
            .unwrap_or_else(|| hotkey.clone());

        let settings = settings::Settings {
            listen_address: self.listen_address,
            axon_port: self.axon_port,
            hotkey,
            min_stake: self.min_stake,
            rate_limit: settings::RateLimitSettings {
                epoch_length_seconds: self.epoch_length,
                counter_key_format: self.counter_key_format,
                counter_key_qualifier,
                store_failure_policy: self.store_failure_policy,
            },
            quota_policy,
            counter_store: self.counter_store,
            redis: settings::RedisSettings {
                host: self.redis_host,
                port: self.redis_port,
                db: self.redis_db,
                username: self.redis_username,
                password: self.redis_password,
            },
            ledger: settings::LedgerSettings {
                sidecar_url: self.sidecar_url,
                netuid: self.netuid,
                network: self.subtensor_network,
                request_timeout: Duration::from_secs(self.ledger_timeout_secs),
            },
            compression: settings::CompressionSettings {
                default_compress_rate: self.compress_rate,
                default_forced_tokens: self.forced_tokens,
                max_concurrent: self.max_concurrent_compressions,
                timeout: (self.compression_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.compression_timeout_secs)),
            },
            tick_interval: Duration::from_secs(self.tick_interval_secs),
            refresh_every_ticks: self.refresh_every_ticks,
            startup_retries: self.startup_retries,
            ..settings::Settings::default()
        };
        settings.validate()?;
        Ok(settings)
    }
}
