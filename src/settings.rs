//! Miner application settings
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::quota::QuotaPolicy;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_AXON_PORT: u16 = 8091;
pub const DEFAULT_AXON_PORT: &str = "8091";
pub const DEFAULT_COUNTER_KEY_FORMAT: &str = "serving_counter:{uid}";
pub const DEFAULT_COMPRESS_RATE: f32 = 0.7;

pub fn default_forced_tokens() -> Vec<String> {
    vec!["\n".to_string(), "?".to_string()]
}

/// Which backend holds the serving counters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CounterStoreKind {
    Redis,
    Memory,
}

impl std::fmt::Display for CounterStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterStoreKind::Redis => write!(f, "redis"),
            CounterStoreKind::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for CounterStoreKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "redis" => Ok(CounterStoreKind::Redis),
            "memory" => Ok(CounterStoreKind::Memory),
            _ => Err(format!("Invalid counter store: {}", s)),
        }
    }
}

/// What a rate-limit check decides when the counter store cannot be reached
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreFailurePolicy {
    /// Deny the request
    #[default]
    FailClosed,
    /// Let the request through
    FailOpen,
}

impl std::fmt::Display for StoreFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreFailurePolicy::FailClosed => write!(f, "fail-closed"),
            StoreFailurePolicy::FailOpen => write!(f, "fail-open"),
        }
    }
}

impl std::str::FromStr for StoreFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "fail-closed" | "closed" => Ok(StoreFailurePolicy::FailClosed),
            "fail-open" | "open" => Ok(StoreFailurePolicy::FailOpen),
            _ => Err(format!("Invalid store failure policy: {}", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            username: None,
            password: None,
        }
    }
}

impl RedisSettings {
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            (Some(user), None) => format!("{}@", user),
            (None, None) => String::new(),
        };
        format!("redis://{}{}:{}/{}", auth, self.host, self.port, self.db)
    }
}

/// Settings for the serving counters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Epoch length: counters expire this long after the first request
    pub epoch_length_seconds: u64,
    /// Key template; `{uid}` is replaced by the caller's uid
    pub counter_key_format: String,
    /// Appended to every key so separate serving instances keep separate counts
    pub counter_key_qualifier: String,
    pub store_failure_policy: StoreFailurePolicy,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            epoch_length_seconds: 600,
            counter_key_format: DEFAULT_COUNTER_KEY_FORMAT.to_string(),
            counter_key_qualifier: String::new(),
            store_failure_policy: StoreFailurePolicy::default(),
        }
    }
}

impl RateLimitSettings {
    pub fn epoch_length(&self) -> Duration {
        Duration::from_secs(self.epoch_length_seconds)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub default_compress_rate: f32,
    pub default_forced_tokens: Vec<String>,
    pub max_concurrent: usize,
    /// `None` disables the timeout
    pub timeout: Option<Duration>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            default_compress_rate: DEFAULT_COMPRESS_RATE,
            default_forced_tokens: default_forced_tokens(),
            max_concurrent: 4,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub sidecar_url: String,
    pub netuid: u16,
    pub network: String,
    pub request_timeout: Duration,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            sidecar_url: "http://localhost:9100".to_string(),
            netuid: 47,
            network: "finney".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // Axon (HTTP API) listen port
    pub axon_port: u16,

    // Our own identity on the ledger
    pub hotkey: String,

    // Admission: callers below this stake are rejected
    pub min_stake: f64,

    pub rate_limit: RateLimitSettings,
    pub quota_policy: QuotaPolicy,
    pub counter_store: CounterStoreKind,
    pub redis: RedisSettings,
    pub ledger: LedgerSettings,
    pub compression: CompressionSettings,

    // Service loop cadence
    pub tick_interval: Duration,
    pub refresh_every_ticks: u64,

    // Attempts at the initial ledger sync before giving up
    pub startup_retries: u32,
    pub startup_retry_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            axon_port: STANDARD_AXON_PORT,
            hotkey: String::new(),
            min_stake: 10_000.0,
            rate_limit: RateLimitSettings::default(),
            quota_policy: QuotaPolicy::default(),
            counter_store: CounterStoreKind::Redis,
            redis: RedisSettings::default(),
            ledger: LedgerSettings::default(),
            compression: CompressionSettings::default(),
            tick_interval: Duration::from_secs(10),
            refresh_every_ticks: 10,
            startup_retries: 5,
            startup_retry_delay: Duration::from_secs(5),
        }
    }
}

impl Settings {
    pub fn socket_address(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.listen_address.parse().map_err(|_| {
            crate::config_error!("Invalid listen address: {}", self.listen_address)
        })?;
        Ok(SocketAddr::from((ip, self.axon_port)))
    }

    /// Reject combinations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.hotkey.trim().is_empty() {
            return Err(crate::config_error!("hotkey address is empty"));
        }
        if self.rate_limit.epoch_length_seconds == 0 {
            return Err(crate::config_error!("epoch length must be > 0"));
        }
        if !self.rate_limit.counter_key_format.contains("{uid}") {
            return Err(crate::config_error!(
                "counter key format '{}' has no {{uid}} placeholder",
                self.rate_limit.counter_key_format
            ));
        }
        if self.refresh_every_ticks == 0 {
            return Err(crate::config_error!("refresh cadence must be > 0"));
        }
        if self.tick_interval.is_zero() {
            return Err(crate::config_error!("tick interval must be > 0"));
        }
        if self.compression.max_concurrent == 0 {
            return Err(crate::config_error!("max concurrent compressions must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.compression.default_compress_rate) {
            return Err(crate::config_error!(
                "compress rate {} outside 0.0..=1.0",
                self.compression.default_compress_rate
            ));
        }
        if !self.min_stake.is_finite() || self.min_stake < 0.0 {
            return Err(crate::config_error!("invalid minimum stake {}", self.min_stake));
        }
        self.quota_policy.validate()?;
        self.socket_address()?;
        Ok(())
    }
}
