//! Miner lifecycle: startup sync and registration check, the HTTP server,
//! and the periodic snapshot refresh.
//!
//! ```text
//! Starting -> Registered -> Serving <-> Refreshing
//!                              |
//!                        ShuttingDown -> Stopped
//! ```
//!
//! The current state is published on a `watch` channel so the API can
//! report it without touching the loop.
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub mod scheduler;

pub use scheduler::RefreshSchedule;

use crate::admission::AdmissionController;
use crate::api::{self, AppState};
use crate::error::{MinerError, Result};
use crate::ledger::Ledger;
use crate::limiters::RateLimiter;
use crate::network::{CallerRecord, NetworkSnapshotHandle, RefreshOutcome};
use crate::processor::{Compressor, RequestProcessor};
use crate::settings::{CounterStoreKind, Settings};
use crate::store::{CounterStore, MemoryCounterStore, RedisCounterStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    Starting,
    Registered,
    Serving,
    Refreshing,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServiceState::Starting => "starting",
            ServiceState::Registered => "registered",
            ServiceState::Serving => "serving",
            ServiceState::Refreshing => "refreshing",
            ServiceState::ShuttingDown => "shutting-down",
            ServiceState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Open the counter store selected in `settings`
pub async fn build_store(settings: &Settings) -> Result<Arc<dyn CounterStore>> {
    match settings.counter_store {
        CounterStoreKind::Redis => Ok(Arc::new(
            RedisCounterStore::connect_with_settings(&settings.redis).await?,
        )),
        CounterStoreKind::Memory => {
            info!("Using in-memory counter store; counts are not shared between instances");
            Ok(Arc::new(MemoryCounterStore::default()))
        }
    }
}

#[derive(Debug)]
pub struct MinerService {
    settings: Settings,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn CounterStore>,
    snapshot: Arc<NetworkSnapshotHandle>,
    admission: AdmissionController,
    processor: RequestProcessor,
    state: watch::Sender<ServiceState>,
}

impl MinerService {
    pub fn new(
        settings: Settings,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn CounterStore>,
        compressor: Arc<dyn Compressor>,
    ) -> Self {
        let snapshot = Arc::new(NetworkSnapshotHandle::new(settings.quota_policy.clone()));
        let rate_limiter = RateLimiter::new(store.clone(), settings.rate_limit.clone());
        let admission = AdmissionController::new(snapshot.clone(), rate_limiter, settings.min_stake);
        let processor = RequestProcessor::new(compressor, &settings.compression);
        let (state, _) = watch::channel(ServiceState::Starting);
        Self {
            settings,
            ledger,
            store,
            snapshot,
            admission,
            processor,
            state,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn snapshot(&self) -> &Arc<NetworkSnapshotHandle> {
        &self.snapshot
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ServiceState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Service state {} -> {}", previous, next);
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            admission: self.admission.clone(),
            processor: self.processor.clone(),
            compression: self.settings.compression.clone(),
            hotkey: self.settings.hotkey.clone(),
            status: self.subscribe(),
        }
    }

    pub async fn router(&self) -> Result<Router> {
        api::api(self.app_state()).await
    }

    /// Initial ledger sync followed by the registration check.
    ///
    /// An unreachable ledger is retried `startup_retries` times. A missing
    /// own hotkey is a `Registration` error and is not retried.
    pub async fn start(&self) -> Result<CallerRecord> {
        self.set_state(ServiceState::Starting);
        self.initial_sync().await?;

        let own = self.snapshot.lookup(&self.settings.hotkey).ok_or_else(|| {
            MinerError::Registration(format!(
                "hotkey {} is not registered on netuid {}",
                self.settings.hotkey, self.settings.ledger.netuid
            ))
        })?;
        info!("Running miner on uid: {}", own.uid);
        self.set_state(ServiceState::Registered);
        Ok(own)
    }

    async fn initial_sync(&self) -> Result<()> {
        let retries = self.settings.startup_retries;
        let mut attempt = 0;
        loop {
            match self.snapshot.refresh(self.ledger.as_ref()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Initial ledger sync failed ({}), retry {}/{} in {:?}",
                        e, attempt, retries, self.settings.startup_retry_delay
                    );
                    tokio::time::sleep(self.settings.startup_retry_delay).await;
                }
                Err(e) => {
                    error!("Initial ledger sync failed after {} retries: {}", retries, e);
                    return Err(e);
                }
            }
        }
    }

    /// Refresh the snapshot once, zeroing the counters of callers whose
    /// quota went up or whose uid changed hands
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.set_state(ServiceState::Refreshing);
        let outcome = self.snapshot.refresh(self.ledger.as_ref()).await;
        self.set_state(ServiceState::Serving);

        let outcome = outcome?;
        if let RefreshOutcome::Refreshed { ref reset, .. } = outcome {
            self.log_standing();
            if !reset.is_empty() {
                let summary = self.admission.rate_limiter().reset_all(reset.iter()).await;
                debug!(
                    "Reset {} serving counters after refresh ({} failed)",
                    summary.reset, summary.failed
                );
            }
        }
        Ok(outcome)
    }

    fn log_standing(&self) {
        let snapshot = self.snapshot.current();
        match snapshot.lookup(&self.settings.hotkey) {
            Some(own) => info!(
                "Block: {} | uid: {} | incentive: {} | stake: {}",
                snapshot.block, own.uid, own.incentive, own.stake
            ),
            None => warn!(
                "Block: {} | hotkey {} no longer registered",
                snapshot.block, self.settings.hotkey
            ),
        }
    }

    /// One pass of the service loop
    pub async fn tick(&self, schedule: &mut RefreshSchedule) {
        if schedule.on_tick() {
            if let Err(e) = self.refresh().await {
                warn!("Snapshot refresh failed, serving with previous state: {}", e);
            }
        }
        if let Err(e) = self.store.expire_keys().await {
            warn!("Counter store housekeeping failed: {}", e);
        }
    }

    /// Register, bind the configured address and run until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = self.settings.socket_address()?;
        self.start().await?;
        let listener = TcpListener::bind(address).await?;
        self.serve_registered(listener, shutdown).await
    }

    /// Run the full lifecycle on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.start().await?;
        self.serve_registered(listener, shutdown).await
    }

    async fn serve_registered<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router().await?;
        let local_address = listener.local_addr()?;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.changed().await;
                })
                .await
        });
        self.set_state(ServiceState::Serving);
        info!("Serving axon on {}", local_address);

        let mut schedule = RefreshSchedule::new(self.settings.refresh_every_ticks);
        // startup sync counts as step 0
        schedule.on_tick();
        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tokio::pin!(shutdown);
        let mut server_result = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                finished = &mut server => {
                    server_result = Some(finished);
                    break;
                }
                _ = ticker.tick() => {
                    // a stuck ledger call must not hold up shutdown
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = self.tick(&mut schedule) => {}
                    }
                }
            }
        }

        self.set_state(ServiceState::ShuttingDown);
        info!("Shutting down miner");
        let _ = stop_tx.send(true);
        let finished = match server_result {
            Some(finished) => finished,
            None => server.await,
        };
        self.set_state(ServiceState::Stopped);
        finished??;
        Ok(())
    }
}
