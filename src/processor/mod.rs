//! Runs compression for admitted requests off the async runtime.
//!
//! Work goes to tokio's blocking pool behind a semaphore, so at most
//! `max_concurrent` compressions run at once and a slow one never stalls
//! admission decisions or responses for other callers. The permit moves into
//! the blocking closure: a request that times out or is abandoned keeps its
//! slot until the compressor actually returns.
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info};

pub mod compressor;

pub use compressor::{Compressor, WordRankCompressor};

use crate::error::{MinerError, Result};
use crate::settings::CompressionSettings;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionJob {
    pub context: String,
    pub rate: f32,
    pub forced_tokens: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompressionOutput {
    pub compressed_context: String,
    pub elapsed: Duration,
}

#[derive(Clone, Debug)]
pub struct RequestProcessor {
    compressor: Arc<dyn Compressor>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl RequestProcessor {
    pub fn new(compressor: Arc<dyn Compressor>, settings: &CompressionSettings) -> Self {
        Self {
            compressor,
            permits: Arc::new(Semaphore::new(settings.max_concurrent)),
            timeout: settings.timeout,
        }
    }

    /// Compressions that could start right now
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    pub async fn process(&self, job: CompressionJob) -> Result<CompressionOutput> {
        let started = Instant::now();
        let work = self.run(job);
        let compressed_context = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| MinerError::ProcessingTimeout(limit))??,
            None => work.await?,
        };
        let elapsed = started.elapsed();
        info!(
            "Text compression completed in {:.4} seconds",
            elapsed.as_secs_f64()
        );
        Ok(CompressionOutput {
            compressed_context,
            elapsed,
        })
    }

    async fn run(&self, job: CompressionJob) -> Result<String> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MinerError::Concurrency(format!("compression pool closed: {}", e)))?;
        debug!("Compressing context of {} chars", job.context.len());
        let compressor = self.compressor.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            compressor.compress(&job.context, job.rate, &job.forced_tokens)
        })
        .await?
    }
}
