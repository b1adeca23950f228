use std::time::Duration;

use tokio::sync::watch;

use crate::admission::AdmissionController;
use crate::processor::RequestProcessor;
use crate::service::ServiceState;
use crate::settings::CompressionSettings;

/// Shared by every handler. Cheap to clone: the heavy parts sit behind `Arc`s.
#[derive(Clone, Debug)]
pub struct AppState {
    pub admission: AdmissionController,
    pub processor: RequestProcessor,
    pub compression: CompressionSettings,
    pub hotkey: String,
    pub status: watch::Receiver<ServiceState>,
}

impl AppState {
    /// Upper bound for a whole HTTP request, above the compression timeout
    pub fn request_timeout(&self) -> Duration {
        match self.compression.timeout {
            Some(t) => t + Duration::from_secs(30),
            None => Duration::from_secs(600),
        }
    }
}
